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

//! Time at which a reverse proxy first saw a request

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use http::HeaderName;

use crate::{request::RequestEnv, utils::FnWrapper};

/// Anything before this is too far in the past to be a real timestamp
const MINIMUM_ACCEPTABLE_SECONDS: u64 = 1_000_000_000;

static X_REQUEST_START: HeaderName = HeaderName::from_static("x-request-start");
static X_QUEUE_START: HeaderName = HeaderName::from_static("x-queue-start");

/// A strategy deriving when the request was first received by the
/// infrastructure in front of the application
pub trait RequestStart: Send + Sync {
    fn request_start(&self, request: &RequestEnv<'_>) -> Option<SystemTime>;
}

impl<F> RequestStart for FnWrapper<F>
where
    F: Fn(&RequestEnv<'_>) -> Option<SystemTime> + Send + Sync,
{
    fn request_start(&self, request: &RequestEnv<'_>) -> Option<SystemTime> {
        (self.0)(request)
    }
}

/// Reads the `X-Request-Start` header, or `X-Queue-Start` if it is absent.
///
/// Every non-digit character is ignored. The first ten digits are the
/// seconds, the next six the fractional part, which covers the common
/// formats:
///
///  - nginx: `t=1512379167.574` (seconds)
///  - apache: `t=1570633834463123` (microseconds)
///  - heroku: `1570634024294` (milliseconds)
#[derive(Clone, Copy, Debug, Default)]
pub struct QueueTimeHeaders;

impl QueueTimeHeaders {
    /// Parse a header value, rejecting timestamps which are implausibly old or
    /// not strictly before `now`
    #[must_use]
    pub fn parse(value: &str, now: SystemTime) -> Option<SystemTime> {
        let digits: Vec<u8> = value
            .bytes()
            .filter(u8::is_ascii_digit)
            .map(|digit| digit - b'0')
            .collect();

        let (seconds, fraction) = digits.split_at(digits.len().min(10));
        let fraction = &fraction[..fraction.len().min(6)];

        let seconds = seconds
            .iter()
            .fold(0_u64, |acc, &digit| acc * 10 + u64::from(digit));
        if seconds < MINIMUM_ACCEPTABLE_SECONDS {
            return None;
        }

        // Right-pad the fraction to microseconds
        let micros = (0..6).fold(0_u32, |acc, i| {
            acc * 10 + fraction.get(i).copied().map_or(0, u32::from)
        });

        let start = UNIX_EPOCH + Duration::new(seconds, micros * 1000);
        if start < now {
            Some(start)
        } else {
            tracing::debug!(header = value, "Ignoring request start timestamp in the future");
            None
        }
    }
}

impl RequestStart for QueueTimeHeaders {
    fn request_start(&self, request: &RequestEnv<'_>) -> Option<SystemTime> {
        let headers = request.headers();
        let value = headers
            .get(&X_REQUEST_START)
            .or_else(|| headers.get(&X_QUEUE_START))?
            .to_str()
            .ok()?;

        Self::parse(value, SystemTime::now())
    }
}

/// Seconds since the Unix epoch, as recorded on spans
pub(crate) fn as_unix_seconds(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map_or(0.0, |duration| duration.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use http::Request;

    use super::*;

    fn now() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    fn at(seconds: u64, micros: u32) -> SystemTime {
        UNIX_EPOCH + Duration::new(seconds, micros * 1000)
    }

    #[test]
    fn parse_common_formats() {
        // nginx
        assert_eq!(
            QueueTimeHeaders::parse("t=1512379167.574", now()),
            Some(at(1_512_379_167, 574_000))
        );
        // apache
        assert_eq!(
            QueueTimeHeaders::parse("t=1570633834463123", now()),
            Some(at(1_570_633_834, 463_123))
        );
        // heroku
        assert_eq!(
            QueueTimeHeaders::parse("1570634024294", now()),
            Some(at(1_570_634_024, 294_000))
        );
        // plain seconds
        assert_eq!(
            QueueTimeHeaders::parse("1600000000", now()),
            Some(at(1_600_000_000, 0))
        );
        // nanoseconds get truncated to microseconds
        assert_eq!(
            QueueTimeHeaders::parse("1600000000123456789", now()),
            Some(at(1_600_000_000, 123_456))
        );
    }

    #[test]
    fn reject_invalid_values() {
        assert_eq!(QueueTimeHeaders::parse("", now()), None);
        assert_eq!(QueueTimeHeaders::parse("t=", now()), None);
        assert_eq!(QueueTimeHeaders::parse("0", now()), None);
        assert_eq!(QueueTimeHeaders::parse("t=999999999.999", now()), None);
        assert_eq!(QueueTimeHeaders::parse("12345", now()), None);
    }

    #[test]
    fn reject_future_values() {
        assert_eq!(QueueTimeHeaders::parse("1800000000", now()), None);
        assert_eq!(QueueTimeHeaders::parse("1700000000", now()), None);
        assert!(QueueTimeHeaders::parse("1699999999.999999", now()).is_some());
    }

    #[test]
    fn read_from_headers() {
        let request = Request::get("/")
            .header("x-queue-start", "t=1512379167.574")
            .body(())
            .unwrap();
        assert_eq!(
            QueueTimeHeaders.request_start(&RequestEnv::new(&request)),
            Some(at(1_512_379_167, 574_000))
        );

        let request = Request::get("/")
            .header("x-request-start", "t=1512379167")
            .header("x-queue-start", "t=1600000000")
            .body(())
            .unwrap();
        assert_eq!(
            QueueTimeHeaders.request_start(&RequestEnv::new(&request)),
            Some(at(1_512_379_167, 0))
        );

        let request = Request::get("/").body(()).unwrap();
        assert_eq!(QueueTimeHeaders.request_start(&RequestEnv::new(&request)), None);
    }

    #[test]
    fn unix_seconds() {
        let seconds = as_unix_seconds(at(1_512_379_167, 500_000));
        assert!((seconds - 1_512_379_167.5).abs() < 1e-6);
    }
}
