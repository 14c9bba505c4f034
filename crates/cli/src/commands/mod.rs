// Copyright 2024 The Matrix.org Foundation C.I.C.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use reqtrace_config::ConfigurationSection;

mod config;
mod server;

#[derive(Parser, Debug)]
enum Subcommand {
    /// Configuration-related commands
    Config(self::config::Options),

    /// Runs a demo web server with request tracing enabled
    Server(self::server::Options),
}

#[derive(Parser, Debug)]
#[command(name = "reqtrace", version, about)]
pub struct Options {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "config.yaml")]
    config: Vec<PathBuf>,

    #[command(subcommand)]
    subcommand: Option<Subcommand>,
}

impl Options {
    pub async fn run(self) -> anyhow::Result<()> {
        use Subcommand as S;
        match &self.subcommand {
            Some(S::Config(c)) => c.run(&self),
            Some(S::Server(c)) => c.run(&self).await,
            None => self::server::Options::default().run(&self).await,
        }
    }

    /// Configuration files are merged in order, then overridden by the
    /// `REQTRACE_` environment variables
    pub fn figment(&self) -> Figment {
        let figment = self
            .config
            .iter()
            .fold(Figment::new(), |figment, path| figment.merge(Yaml::file(path)));

        figment.merge(Env::prefixed("REQTRACE_").split("__"))
    }

    pub fn load_config<T: ConfigurationSection>(&self) -> anyhow::Result<T> {
        T::extract(&self.figment()).context("could not load configuration")
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;
    use reqtrace_config::{RequestTracingConfig, RootConfig, TracingExporterKind};

    use super::*;

    #[test]
    fn merge_files_and_environment() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "base.yaml",
                r"
request_tracing:
  untraced_endpoints:
    - /health
telemetry:
  tracing:
    exporter: stdout
",
            )?;
            jail.create_file(
                "override.yaml",
                r"
request_tracing:
  record_frontend_span: true
",
            )?;
            jail.set_env("REQTRACE_TELEMETRY__TRACING__EXPORTER", "none");

            let opts = Options::parse_from(["reqtrace", "-c", "base.yaml", "-c", "override.yaml"]);

            let config: RootConfig = opts.load_config().unwrap();
            assert_eq!(config.request_tracing.untraced_endpoints, ["/health"]);
            assert!(config.request_tracing.record_frontend_span);
            assert_eq!(config.telemetry.tracing.exporter, TracingExporterKind::None);

            let section: RequestTracingConfig = opts.load_config().unwrap();
            assert!(section.record_frontend_span);

            Ok(())
        });
    }

    #[test]
    fn missing_file_uses_defaults() {
        Jail::expect_with(|_jail| {
            let opts = Options::parse_from(["reqtrace", "config", "check"]);
            let config: RootConfig = opts.load_config().unwrap();
            assert!(config.request_tracing.untraced_endpoints.is_empty());

            Ok(())
        });
    }
}
