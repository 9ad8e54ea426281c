use anyhow::Result;
use clickhouse::Client;
use serde::{Deserialize, Serialize};

/// Connection settings for the ClickHouse time-series store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickHouseConfig {
    pub url: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub readings_table: String,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            database: "weather".to_string(),
            username: "default".to_string(),
            password: "".to_string(),
            readings_table: "sensor_readings".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct ClickHouseClient {
    client: Client,
}

impl ClickHouseClient {
    pub fn new(config: &ClickHouseConfig) -> Self {
        let client = Client::default()
            .with_url(&config.url)
            .with_database(&config.database)
            .with_user(&config.username)
            .with_password(&config.password)
            .with_compression(clickhouse::Compression::Lz4);

        Self { client }
    }

    pub async fn ping(&self) -> Result<()> {
        self.client.query("SELECT 1").fetch_one::<u8>().await?;
        Ok(())
    }

    pub fn get_client(&self) -> &Client {
        &self.client
    }
}
