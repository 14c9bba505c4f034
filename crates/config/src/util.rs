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

use figment::{error::Error as FigmentError, Figment};
use serde::de::DeserializeOwned;

/// A part of the configuration, living under the key named by
/// [`ConfigurationSection::PATH`]
pub trait ConfigurationSection: Sized + DeserializeOwned {
    /// Where this section lives relative to the root, `None` for the root
    /// itself
    const PATH: Option<&'static str> = None;

    /// Validate the configuration section
    ///
    /// Errors are relative to the section: their path is prefixed with
    /// [`ConfigurationSection::PATH`] when the section is loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid
    fn validate(&self, _figment: &Figment) -> Result<(), FigmentError> {
        Ok(())
    }

    /// Load and validate the section
    ///
    /// # Errors
    ///
    /// Returns an error if the section could not be deserialized or is invalid
    fn extract(figment: &Figment) -> Result<Self, FigmentError> {
        let this: Self = match Self::PATH {
            Some(path) => figment.extract_inner(path)?,
            None => figment.extract()?,
        };

        validate_section(&this, figment)?;
        Ok(this)
    }

    /// Load and validate the section, or use its default value if the
    /// configuration doesn't mention it at all
    ///
    /// # Errors
    ///
    /// Returns an error if the section is present but could not be
    /// deserialized or is invalid
    fn extract_or_default(figment: &Figment) -> Result<Self, FigmentError>
    where
        Self: Default,
    {
        match Self::PATH {
            Some(path) if !figment.contains(path) => Ok(Self::default()),
            _ => Self::extract(figment),
        }
    }
}

/// Validate a section, reporting errors under the section path
pub(crate) fn validate_section<T: ConfigurationSection>(
    section: &T,
    figment: &Figment,
) -> Result<(), FigmentError> {
    section.validate(figment).map_err(|mut err| {
        if let Some(path) = T::PATH {
            let mut full_path: Vec<String> = path.split('.').map(str::to_owned).collect();
            full_path.append(&mut err.path);
            err.path = full_path;
        }
        err
    })
}
