//! Remote CSV sources over HTTP.
//!
//! The response body is read as a forward-only stream, so sniffing uses the
//! initial line buffer and the reader cannot be rewound.

use std::time::Duration;

use crate::config::Config;
use crate::error::{CsvError, Result};
use crate::reader::StreamReader;

/// Default timeout for HTTP requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

impl From<ureq::Error> for CsvError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => {
                CsvError::Http(format!("server returned status {code}"))
            }
            _ => CsvError::Http(err.to_string()),
        }
    }
}

/// Open a streaming reader over the body of `url`.
pub fn open_url(url: &str, config: &Config) -> Result<StreamReader<'static>> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(CsvError::Http(format!(
            "URL must start with http:// or https://: {url}"
        )));
    }

    let agent_config = ureq::Agent::config_builder()
        .timeout_global(Some(DEFAULT_TIMEOUT))
        .build();
    let agent = ureq::Agent::new_with_config(agent_config);

    let response = agent.get(url).call()?;
    let body = response.into_body().into_reader();
    StreamReader::from_stream(body, config)
}
