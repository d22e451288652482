//! Client for the metering server's outdoor-temperature registry.
//!
//! Thin REST wrapper: authenticate (or reuse a token), resolve the
//! destination territory, optionally read the existing records for
//! missing-only mode, and upsert the imported batch.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, NaiveDate};
use reqwest::{Client as HttpClient, Method, RequestBuilder};
use serde_derive::{Deserialize, Serialize};
use tracing::info;

use crate::error::ServerError;
use crate::model::TemperatureRecord;

/// Application name reported to the server on login.
const APPLICATION_NAME: &str = "Temperature import utility";

/// Territory the outdoor temperatures are attached to.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Territory {
    pub id: i64,
    pub name: String,
    /// Offset from UTC in whole hours; used to place record dates on the
    /// territory's local timeline.
    pub time_zone_offset: i32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutdoorTemperature {
    date: DateTime<FixedOffset>,
    value: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    application: &'a str,
    login: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
}

pub struct LersClient {
    http_client: HttpClient,
    base_url: String,
    token: Option<String>,
}

impl LersClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            http_client: HttpClient::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Uses a caller-supplied bearer token instead of logging in.
    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        let builder = self.http_client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(
        &self,
        path: &str,
        builder: RequestBuilder,
    ) -> Result<reqwest::Response, ServerError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ServerError::status(
                format!("{}/{}", self.base_url, path),
                status,
            ));
        }
        Ok(response)
    }

    /// Logs in with plain credentials and stores the returned token for
    /// subsequent requests.
    pub async fn authenticate(&mut self, login: &str, password: &str) -> Result<(), ServerError> {
        let path = "api/v1/Login/Plain";
        let builder = self.request(Method::POST, path).json(&LoginRequest {
            application: APPLICATION_NAME,
            login,
            password,
        });
        let response = self.send(path, builder).await?;
        let login_response: LoginResponse = response.json().await?;
        self.token = Some(login_response.token);
        Ok(())
    }

    /// Resolves the destination territory.
    ///
    /// An empty name means the server's default territory (id 1); a
    /// non-empty name must match an existing territory's name exactly.
    pub async fn get_territory(&self, name: &str) -> Result<Territory, ServerError> {
        if name.is_empty() {
            let path = "api/v1/Territories/1";
            let builder = self.request(Method::GET, path);
            let response = self.send(path, builder).await?;
            return Ok(response.json().await?);
        }

        let path = "api/v1/Territories";
        let builder = self.request(Method::GET, path);
        let response = self.send(path, builder).await?;
        let territories: Vec<Territory> = response.json().await?;

        territories
            .into_iter()
            .find(|territory| territory.name == name)
            .ok_or_else(|| ServerError::TerritoryNotFound(name.to_string()))
    }

    /// Reads the territory's existing records keyed by local date.
    pub async fn get_existing_temperatures(
        &self,
        territory_id: i64,
    ) -> Result<HashMap<NaiveDate, f64>, ServerError> {
        let path = format!("api/v1/Territories/{territory_id}/OutdoorTemperature");
        let builder = self.request(Method::GET, &path);
        let response = self.send(&path, builder).await?;
        let existing: Vec<OutdoorTemperature> = response.json().await?;

        Ok(existing
            .into_iter()
            .map(|record| (record.date.date_naive(), record.value))
            .collect())
    }

    /// Upserts the imported records into the territory's registry.
    ///
    /// In missing-only mode, dates the server already has are dropped
    /// first. When nothing is left to write, no request is issued.
    pub async fn save(
        &self,
        records: &[TemperatureRecord],
        territory: &Territory,
        missing_only: bool,
    ) -> Result<(), ServerError> {
        let existing = if missing_only {
            Some(self.get_existing_temperatures(territory.id).await?)
        } else {
            None
        };

        let offset = FixedOffset::east_opt(territory.time_zone_offset * 3600).ok_or_else(|| {
            ServerError::UnexpectedResponse(format!(
                "territory UTC offset {} is out of range",
                territory.time_zone_offset
            ))
        })?;

        let outdoor: Vec<OutdoorTemperature> = records
            .iter()
            .filter(|record| match &existing {
                Some(existing) => !existing.contains_key(&record.date),
                None => true,
            })
            .map(|record| OutdoorTemperature {
                // Midnight with a fixed offset is never ambiguous.
                date: record
                    .date
                    .and_hms_opt(0, 0, 0)
                    .expect("midnight is a valid time")
                    .and_local_timezone(offset)
                    .unwrap(),
                value: record.temperature,
            })
            .collect();

        if outdoor.is_empty() {
            info!("no data to save");
            return Ok(());
        }

        info!("saving {} record(s)", outdoor.len());
        let path = format!("api/v1/Territories/{}/OutdoorTemperature", territory.id);
        let builder = self.request(Method::POST, &path).json(&outdoor);
        self.send(&path, builder).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn territory() -> Territory {
        Territory {
            id: 7,
            name: "Main".to_string(),
            time_zone_offset: 3,
        }
    }

    fn record(y: i32, m: u32, d: u32, temperature: f64) -> TemperatureRecord {
        TemperatureRecord {
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            temperature,
        }
    }

    mod authentication {
        use super::*;

        #[tokio::test]
        async fn test_login_stores_bearer_token() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/api/v1/Login/Plain"))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "t-123"})),
                )
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/api/v1/Territories/1"))
                .and(header("authorization", "Bearer t-123"))
                .respond_with(ResponseTemplate::new(200).set_body_json(
                    serde_json::json!({"id": 1, "name": "Default", "timeZoneOffset": 3}),
                ))
                .expect(1)
                .mount(&server)
                .await;

            let mut client = LersClient::new(server.uri());
            client.authenticate("user", "secret").await.unwrap();

            let territory = client.get_territory("").await.unwrap();
            assert_eq!(territory.id, 1);
            assert_eq!(territory.time_zone_offset, 3);
        }

        #[tokio::test]
        async fn test_bad_credentials_map_to_auth_failed() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/api/v1/Login/Plain"))
                .respond_with(ResponseTemplate::new(401))
                .mount(&server)
                .await;

            let mut client = LersClient::new(server.uri());
            let err = client.authenticate("user", "wrong").await.unwrap_err();
            assert!(matches!(err, ServerError::AuthFailed));
        }
    }

    mod territories {
        use super::*;

        #[tokio::test]
        async fn test_named_territory_exact_match() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/v1/Territories"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                    {"id": 1, "name": "Default", "timeZoneOffset": 3},
                    {"id": 7, "name": "Branch", "timeZoneOffset": 5}
                ])))
                .mount(&server)
                .await;

            let mut client = LersClient::new(server.uri());
            client.set_token("t");

            let territory = client.get_territory("Branch").await.unwrap();
            assert_eq!(territory.id, 7);
            assert_eq!(territory.time_zone_offset, 5);
        }

        #[tokio::test]
        async fn test_missing_named_territory_fails() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/v1/Territories"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
                .mount(&server)
                .await;

            let mut client = LersClient::new(server.uri());
            client.set_token("t");

            let err = client.get_territory("Branch").await.unwrap_err();
            assert!(matches!(err, ServerError::TerritoryNotFound(_)));
        }
    }

    mod saving {
        use super::*;

        #[tokio::test]
        async fn test_save_converts_dates_to_territory_offset() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/api/v1/Territories/7/OutdoorTemperature"))
                .and(body_json(serde_json::json!([
                    {"date": "2024-03-01T00:00:00+03:00", "value": -11.0}
                ])))
                .respond_with(ResponseTemplate::new(200))
                .expect(1)
                .mount(&server)
                .await;

            let mut client = LersClient::new(server.uri());
            client.set_token("t");

            client
                .save(&[record(2024, 3, 1, -11.0)], &territory(), false)
                .await
                .unwrap();
        }

        #[tokio::test]
        async fn test_missing_only_drops_existing_dates() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/v1/Territories/7/OutdoorTemperature"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                    {"date": "2024-03-01T00:00:00+03:00", "value": -11.0}
                ])))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("POST"))
                .and(path("/api/v1/Territories/7/OutdoorTemperature"))
                .and(body_json(serde_json::json!([
                    {"date": "2024-03-02T00:00:00+03:00", "value": -9.5}
                ])))
                .respond_with(ResponseTemplate::new(200))
                .expect(1)
                .mount(&server)
                .await;

            let mut client = LersClient::new(server.uri());
            client.set_token("t");

            client
                .save(
                    &[record(2024, 3, 1, -11.0), record(2024, 3, 2, -9.5)],
                    &territory(),
                    true,
                )
                .await
                .unwrap();
        }

        #[tokio::test]
        async fn test_nothing_new_issues_no_write() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/v1/Territories/7/OutdoorTemperature"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                    {"date": "2024-03-01T00:00:00+03:00", "value": -11.0}
                ])))
                .mount(&server)
                .await;
            Mock::given(method("POST"))
                .and(path("/api/v1/Territories/7/OutdoorTemperature"))
                .respond_with(ResponseTemplate::new(200))
                .expect(0)
                .mount(&server)
                .await;

            let mut client = LersClient::new(server.uri());
            client.set_token("t");

            client
                .save(&[record(2024, 3, 1, -11.0)], &territory(), true)
                .await
                .unwrap();
        }

        #[tokio::test]
        async fn test_empty_record_set_issues_no_requests() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/api/v1/Territories/7/OutdoorTemperature"))
                .respond_with(ResponseTemplate::new(200))
                .expect(0)
                .mount(&server)
                .await;

            let mut client = LersClient::new(server.uri());
            client.set_token("t");

            client.save(&[], &territory(), false).await.unwrap();
        }

        #[tokio::test]
        async fn test_server_error_propagates() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/api/v1/Territories/7/OutdoorTemperature"))
                .respond_with(ResponseTemplate::new(500))
                .mount(&server)
                .await;

            let mut client = LersClient::new(server.uri());
            client.set_token("t");

            let err = client
                .save(&[record(2024, 3, 1, -11.0)], &territory(), false)
                .await
                .unwrap_err();
            assert!(matches!(err, ServerError::Status { status: 500, .. }));
        }
    }
}
