use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{
  header::{HeaderMap, HeaderValue},
  Client as HttpClient,
};
use serde::{Deserialize, Serialize};

use super::{Inverter, Publication, SinkError};

fn default_timeout() -> u32 {
  10
}

#[derive(Debug, Clone, Deserialize)]
struct Settings {
  url: String,
  api_key: Option<String>,
  #[serde(default = "default_timeout")]
  timeout: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Request<'a> {
  timestamp: DateTime<Utc>,
  host: &'a str,
  model: &'a str,
  data: serde_json::Value,
}

/// Posts every snapshot as JSON.
#[derive(Debug, Default)]
pub(crate) struct Sink {
  endpoint: Option<String>,
  http: Option<HttpClient>,
}

#[async_trait::async_trait]
impl super::Sink for Sink {
  fn name(&self) -> &'static str {
    "webhook"
  }

  fn configure(
    &mut self,
    settings: &serde_json::Value,
    inverter: &Inverter,
  ) -> Result<(), SinkError> {
    let settings = serde_json::from_value::<Settings>(settings.clone())?;

    let mut headers = HeaderMap::new();
    if let Some(api_key) = settings.api_key {
      headers.insert("X-API-Key", HeaderValue::from_str(api_key.as_str())?);
    }

    let http = HttpClient::builder()
      .timeout(Duration::from_secs(settings.timeout as u64))
      .default_headers(headers)
      .gzip(true)
      .build()?;

    self.endpoint = Some(endpoint(&settings.url, inverter));
    self.http = Some(http);

    Ok(())
  }

  #[tracing::instrument(skip_all, fields(count = publication.snapshot.len()))]
  async fn publish(&self, publication: Publication<'_>) {
    let (Some(endpoint), Some(http)) = (&self.endpoint, &self.http) else {
      tracing::warn!("Publishing to an unconfigured webhook");
      return;
    };

    let request = Request {
      timestamp: chrono::offset::Utc::now(),
      host: publication.inverter.host.as_str(),
      model: publication.inverter.model(),
      data: publication.snapshot.to_json(),
    };

    let http_response = http.post(endpoint.clone()).json(&request).send().await;
    let http_response = match http_response {
      Ok(http_response) => http_response,
      Err(error) => {
        tracing::warn! {
          %error,
          "Failed posting {:?} values to {}",
          publication.snapshot.len(),
          endpoint,
        }
        return;
      }
    };

    let status_code = http_response.status();
    if status_code.is_success() {
      tracing::trace!(
        "Posted {:?} values {:?}",
        publication.snapshot.len(),
        status_code
      );
    } else {
      let text = http_response.text().await.unwrap_or_default();
      tracing::warn!("Webhook responded {:?} {}", status_code, text);
    }
  }
}

/// `{model}` in the url is replaced with the model without punctuation.
fn endpoint(url: &str, inverter: &Inverter) -> String {
  url.replace("{model}", inverter.clean_model().as_str())
}

#[cfg(test)]
mod tests {
  use super::super::Sink as _;
  use super::*;

  fn inverter() -> Inverter {
    Inverter {
      host: "10.0.0.5".to_owned(),
      model: Some("SG7.0RT".to_owned()),
    }
  }

  #[test]
  fn model_placeholder_is_replaced() {
    assert_eq!(
      endpoint("http://localhost:8080/solar/{model}", &inverter()),
      "http://localhost:8080/solar/SG70RT"
    );
  }

  #[test]
  fn configure_needs_a_url() {
    let mut sink = Sink::default();

    assert!(matches!(
      sink.configure(&serde_json::json!({ "timeout": 3 }), &inverter()),
      Err(SinkError::Settings(_))
    ));
    assert!(sink
      .configure(
        &serde_json::json!({
          "url": "http://localhost/{model}",
          "api_key": "key"
        }),
        &inverter()
      )
      .is_ok());
    assert_eq!(sink.endpoint.as_deref(), Some("http://localhost/SG70RT"));
  }
}
