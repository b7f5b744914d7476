//! 天气数据源与缓存
//!
//! Open-Meteo 当前天气 + 未来数日预报。拉取失败时沿用上一次成功的缓存，
//! 从未成功过则给空快照。天气缺失永远不是错误，不允许它中断调用方。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// 预报中的一天
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastDay {
    pub date: NaiveDate,
    pub temperature_max: f64,
    pub temperature_min: f64,
    pub precipitation: f64,
}

/// 天气快照：当前观测 + 预报
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSnapshot {
    /// 当前气温（摄氏）
    pub temperature: f64,
    pub precipitation: f64,
    pub wind_speed: f64,
    pub condition: String,
    pub forecast: Vec<ForecastDay>,
    /// None 表示从未成功拉取过（空快照哨兵）
    pub fetched_at: Option<DateTime<Utc>>,
}

impl WeatherSnapshot {
    /// 从未拉取过天气时的空快照
    pub fn empty() -> Self {
        Self {
            temperature: 0.0,
            precipitation: 0.0,
            wind_speed: 0.0,
            condition: "unknown".to_string(),
            forecast: Vec::new(),
            fetched_at: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fetched_at.is_none()
    }
}

/// 天气数据源接口
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn fetch_forecast(&self) -> Result<WeatherSnapshot, String>;
}

/// Open-Meteo 数据源：无需 API Key，GET 请求带超时
pub struct HttpWeatherProvider {
    client: Client,
    latitude: f64,
    longitude: f64,
}

impl HttpWeatherProvider {
    pub fn new(latitude: f64, longitude: f64, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent("sprout/0.1")
            .build()
            .unwrap_or_default();
        Self {
            client,
            latitude,
            longitude,
        }
    }
}

#[async_trait]
impl WeatherProvider for HttpWeatherProvider {
    async fn fetch_forecast(&self) -> Result<WeatherSnapshot, String> {
        let url = format!(
            "https://api.open-meteo.com/v1/forecast?latitude={}&longitude={}\
             &current=temperature_2m,precipitation,wind_speed_10m,weather_code\
             &daily=temperature_2m_max,temperature_2m_min,precipitation_sum\
             &timezone=UTC&forecast_days=5",
            self.latitude, self.longitude
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }

        let body: OpenMeteoResponse = resp
            .json()
            .await
            .map_err(|e| format!("Bad weather payload: {}", e))?;

        let forecast = body
            .daily
            .time
            .iter()
            .enumerate()
            .map(|(i, date)| ForecastDay {
                date: *date,
                temperature_max: body.daily.temperature_2m_max.get(i).copied().unwrap_or(0.0),
                temperature_min: body.daily.temperature_2m_min.get(i).copied().unwrap_or(0.0),
                precipitation: body.daily.precipitation_sum.get(i).copied().unwrap_or(0.0),
            })
            .collect();

        Ok(WeatherSnapshot {
            temperature: body.current.temperature_2m,
            precipitation: body.current.precipitation,
            wind_speed: body.current.wind_speed_10m,
            condition: describe_weather_code(body.current.weather_code),
            forecast,
            fetched_at: Some(Utc::now()),
        })
    }
}

#[derive(Deserialize)]
struct OpenMeteoResponse {
    current: OpenMeteoCurrent,
    daily: OpenMeteoDaily,
}

#[derive(Deserialize)]
struct OpenMeteoCurrent {
    temperature_2m: f64,
    precipitation: f64,
    wind_speed_10m: f64,
    weather_code: i32,
}

#[derive(Deserialize)]
struct OpenMeteoDaily {
    time: Vec<NaiveDate>,
    temperature_2m_max: Vec<f64>,
    temperature_2m_min: Vec<f64>,
    precipitation_sum: Vec<f64>,
}

/// WMO weather code 转可读描述
fn describe_weather_code(code: i32) -> String {
    match code {
        0 => "clear",
        1..=3 => "partly cloudy",
        45 | 48 => "fog",
        51..=67 => "rain",
        71..=77 => "snow",
        80..=82 => "showers",
        95..=99 => "thunderstorm",
        _ => "unknown",
    }
    .to_string()
}

/// 天气缓存：保存最近一次成功的快照；只有成功拉取才会替换缓存
pub struct WeatherCache {
    provider: Arc<dyn WeatherProvider>,
    cached: RwLock<WeatherSnapshot>,
}

impl WeatherCache {
    pub fn new(provider: Arc<dyn WeatherProvider>) -> Self {
        Self {
            provider,
            cached: RwLock::new(WeatherSnapshot::empty()),
        }
    }

    /// 当前缓存副本（不触发拉取）
    pub async fn cached(&self) -> WeatherSnapshot {
        self.cached.read().await.clone()
    }

    /// 拉取最新天气；失败时返回缓存副本（从未成功过则为空快照）
    pub async fn refresh(&self) -> WeatherSnapshot {
        match self.provider.fetch_forecast().await {
            Ok(snapshot) => {
                *self.cached.write().await = snapshot.clone();
                snapshot
            }
            Err(e) => {
                tracing::warn!("Weather fetch failed, using cached snapshot: {}", e);
                self.cached.read().await.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakyProvider {
        ok: RwLock<bool>,
    }

    #[async_trait]
    impl WeatherProvider for FlakyProvider {
        async fn fetch_forecast(&self) -> Result<WeatherSnapshot, String> {
            if *self.ok.read().await {
                Ok(WeatherSnapshot {
                    temperature: 21.5,
                    ..WeatherSnapshot::empty()
                })
                .map(|mut s| {
                    s.fetched_at = Some(Utc::now());
                    s
                })
            } else {
                Err("network down".to_string())
            }
        }
    }

    #[tokio::test]
    async fn test_refresh_keeps_stale_cache_on_failure() {
        let provider = Arc::new(FlakyProvider {
            ok: RwLock::new(true),
        });
        let cache = WeatherCache::new(provider.clone());

        let fresh = cache.refresh().await;
        assert!(!fresh.is_empty());
        assert_eq!(fresh.temperature, 21.5);

        *provider.ok.write().await = false;
        let stale = cache.refresh().await;
        assert!(!stale.is_empty());
        assert_eq!(stale.temperature, 21.5);
    }

    #[tokio::test]
    async fn test_refresh_without_any_success_yields_empty() {
        let provider = Arc::new(FlakyProvider {
            ok: RwLock::new(false),
        });
        let cache = WeatherCache::new(provider);

        let snapshot = cache.refresh().await;
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_weather_code_mapping() {
        assert_eq!(describe_weather_code(0), "clear");
        assert_eq!(describe_weather_code(61), "rain");
        assert_eq!(describe_weather_code(96), "thunderstorm");
        assert_eq!(describe_weather_code(-1), "unknown");
    }
}
