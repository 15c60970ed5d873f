//! Public dataset connector: a closed set of named sources that resolve to
//! a [`TabularBatch`] ready for registration.
//!
//! Only the covid source talks to an upstream service; weather and stocks
//! are canned datasets so the endpoint works offline.

use serde_json::{json, Value};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::batch::TabularBatch;
use crate::error::{DeckError, Result};

pub const DEFAULT_COVID_LIMIT: usize = 10;
pub const MAX_COVID_LIMIT: usize = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicSource {
    Covid,
    Weather,
    Stocks,
}

impl PublicSource {
    pub const ALL: &'static [PublicSource] =
        &[PublicSource::Covid, PublicSource::Weather, PublicSource::Stocks];

    pub fn as_str(&self) -> &'static str {
        match self {
            PublicSource::Covid => "covid",
            PublicSource::Weather => "weather",
            PublicSource::Stocks => "stocks",
        }
    }

    /// Default table name for data fetched from this source.
    pub fn table_name(&self) -> &'static str {
        match self {
            PublicSource::Covid => "covid_data",
            PublicSource::Weather => "weather_data",
            PublicSource::Stocks => "stock_data",
        }
    }
}

impl FromStr for PublicSource {
    type Err = DeckError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "covid" => Ok(PublicSource::Covid),
            "weather" => Ok(PublicSource::Weather),
            "stocks" => Ok(PublicSource::Stocks),
            other => Err(DeckError::InvalidParams(format!(
                "unknown public source '{other}'; available: covid, weather, stocks"
            ))),
        }
    }
}

pub struct PublicDataClient {
    http: reqwest::Client,
    covid_base_url: String,
}

impl PublicDataClient {
    pub fn new(covid_base_url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| DeckError::InvalidParams(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            http,
            covid_base_url: covid_base_url.into(),
        })
    }

    pub async fn fetch(&self, source: PublicSource, limit: Option<usize>) -> Result<TabularBatch> {
        let limit = limit
            .unwrap_or(DEFAULT_COVID_LIMIT)
            .clamp(1, MAX_COVID_LIMIT);
        match source {
            PublicSource::Covid => self.fetch_covid(limit).await,
            PublicSource::Weather => weather_batch(),
            PublicSource::Stocks => stocks_batch(),
        }
    }

    async fn fetch_covid(&self, limit: usize) -> Result<TabularBatch> {
        let url = format!("{}/v3/covid-19/countries", self.covid_base_url.trim_end_matches('/'));
        debug!(%url, limit, "fetching covid data");

        let response = self.http.get(&url).send().await.map_err(map_transport)?;
        if !response.status().is_success() {
            let status = response.status();
            warn!(%status, "covid upstream returned an error status");
            return Err(DeckError::UpstreamUnavailable(format!(
                "covid upstream returned {status}"
            )));
        }
        let body: Value = response.json().await.map_err(|e| {
            DeckError::UpstreamSchemaChanged(format!("covid response was not valid JSON: {e}"))
        })?;

        let Value::Array(countries) = body else {
            return Err(DeckError::UpstreamSchemaChanged(
                "expected a JSON array of country records".to_string(),
            ));
        };

        let mut rows: Vec<Vec<Value>> = Vec::with_capacity(limit);
        for entry in countries.into_iter().take(limit) {
            rows.push(normalize_covid_row(&entry)?);
        }
        if rows.is_empty() {
            return Err(DeckError::UpstreamSchemaChanged(
                "covid upstream returned no records".to_string(),
            ));
        }
        TabularBatch::from_rows(covid_columns(), rows)
    }
}

fn map_transport(e: reqwest::Error) -> DeckError {
    if e.is_timeout() {
        DeckError::UpstreamTimeout(e.to_string())
    } else {
        DeckError::UpstreamUnavailable(e.to_string())
    }
}

fn covid_columns() -> Vec<String> {
    ["country", "cases", "deaths", "recovered", "active"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Pull the stable subset of fields out of one upstream record. A missing
/// country name or non-numeric counts means the upstream shape moved.
fn normalize_covid_row(entry: &Value) -> Result<Vec<Value>> {
    let country = entry.get("country").and_then(Value::as_str).ok_or_else(|| {
        DeckError::UpstreamSchemaChanged("record is missing a 'country' field".to_string())
    })?;
    let mut row = vec![Value::String(country.to_string())];
    for key in ["cases", "deaths", "recovered", "active"] {
        let n = entry.get(key).and_then(Value::as_i64).ok_or_else(|| {
            DeckError::UpstreamSchemaChanged(format!("record field '{key}' is not an integer"))
        })?;
        row.push(json!(n));
    }
    Ok(row)
}

fn weather_batch() -> Result<TabularBatch> {
    let columns = ["city", "temperature_c", "humidity_pct", "condition"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let rows = vec![
        vec![json!("New York"), json!(22.5), json!(65), json!("Partly Cloudy")],
        vec![json!("London"), json!(15.2), json!(78), json!("Rainy")],
        vec![json!("Tokyo"), json!(26.8), json!(70), json!("Sunny")],
        vec![json!("Sydney"), json!(18.3), json!(60), json!("Clear")],
        vec![json!("Paris"), json!(19.7), json!(72), json!("Overcast")],
        vec![json!("Mumbai"), json!(31.4), json!(85), json!("Humid")],
    ];
    TabularBatch::from_rows(columns, rows)
}

fn stocks_batch() -> Result<TabularBatch> {
    let columns = ["symbol", "company", "price", "change_pct", "volume"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let rows = vec![
        vec![json!("AAPL"), json!("Apple Inc."), json!(178.25), json!(1.2), json!(52_400_000)],
        vec![json!("GOOGL"), json!("Alphabet Inc."), json!(141.80), json!(-0.5), json!(18_700_000)],
        vec![json!("MSFT"), json!("Microsoft Corp."), json!(412.30), json!(0.8), json!(21_300_000)],
        vec![json!("AMZN"), json!("Amazon.com Inc."), json!(176.45), json!(2.1), json!(39_800_000)],
        vec![json!("TSLA"), json!("Tesla Inc."), json!(248.90), json!(-1.7), json!(88_100_000)],
        vec![json!("NVDA"), json!("NVIDIA Corp."), json!(875.60), json!(3.4), json!(44_500_000)],
    ];
    TabularBatch::from_rows(columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::ColumnType;

    #[test]
    fn source_names_parse_case_insensitively() {
        assert_eq!("COVID".parse::<PublicSource>().unwrap(), PublicSource::Covid);
        assert_eq!(" weather ".parse::<PublicSource>().unwrap(), PublicSource::Weather);
        assert!(matches!(
            "crypto".parse::<PublicSource>(),
            Err(DeckError::InvalidParams(_))
        ));
    }

    #[test]
    fn canned_sources_resolve_offline() {
        let weather = weather_batch().unwrap();
        assert_eq!(weather.columns[0], "city");
        assert_eq!(weather.column_types[1], ColumnType::Double);
        assert_eq!(weather.row_count(), 6);

        let stocks = stocks_batch().unwrap();
        assert_eq!(stocks.columns, vec!["symbol", "company", "price", "change_pct", "volume"]);
        assert!(stocks.row_count() > 0);
    }

    #[test]
    fn covid_rows_require_the_stable_fields() {
        let good = json!({"country": "France", "cases": 100, "deaths": 2, "recovered": 90, "active": 8});
        assert_eq!(normalize_covid_row(&good).unwrap().len(), 5);

        let missing = json!({"country": "France", "cases": 100});
        assert!(matches!(
            normalize_covid_row(&missing),
            Err(DeckError::UpstreamSchemaChanged(_))
        ));

        let wrong_type = json!({"country": "France", "cases": "lots", "deaths": 2, "recovered": 90, "active": 8});
        assert!(matches!(
            normalize_covid_row(&wrong_type),
            Err(DeckError::UpstreamSchemaChanged(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_upstream_maps_to_unavailable() {
        let client = PublicDataClient::new("http://127.0.0.1:9", 2).unwrap();
        let err = client.fetch(PublicSource::Covid, None).await.unwrap_err();
        assert!(matches!(
            err,
            DeckError::UpstreamUnavailable(_) | DeckError::UpstreamTimeout(_)
        ));
    }
}
