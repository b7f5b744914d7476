//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SPROUT__*` 覆盖（双下划线表示嵌套，如 `SPROUT__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub weather: WeatherSection,
    #[serde(default)]
    pub garden: GardenSection,
    #[serde(default)]
    pub monitoring: MonitoringSection,
    #[serde(default)]
    pub permission: PermissionSection,
    #[serde(default)]
    pub results: ResultsSection,
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock；优先级由 API Key 与 provider 共同决定
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub deepseek: LlmDeepSeekSection,
    #[serde(default)]
    pub openai: LlmOpenAiSection,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            deepseek: LlmDeepSeekSection::default(),
            openai: LlmOpenAiSection::default(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmDeepSeekSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmOpenAiSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [weather] 段：观测点坐标与请求超时
#[derive(Debug, Clone, Deserialize)]
pub struct WeatherSection {
    #[serde(default = "default_latitude")]
    pub latitude: f64,
    #[serde(default = "default_longitude")]
    pub longitude: f64,
    #[serde(default = "default_weather_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WeatherSection {
    fn default() -> Self {
        Self {
            latitude: default_latitude(),
            longitude: default_longitude(),
            timeout_secs: default_weather_timeout_secs(),
        }
    }
}

fn default_latitude() -> f64 {
    47.61
}

fn default_longitude() -> f64 {
    -122.33
}

fn default_weather_timeout_secs() -> u64 {
    10
}

/// [garden] 段：数据目录与园主侧输入（储藏容量、半球、规划目标）
#[derive(Debug, Clone, Deserialize)]
pub struct GardenSection {
    /// garden.json / agent_results.json 所在目录，未设置时用 ./garden_data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// northern / southern，决定 seasonData 的季节推算
    #[serde(default = "default_hemisphere")]
    pub hemisphere: String,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default = "default_planning_goals")]
    pub planning_goals: Vec<String>,
}

impl Default for GardenSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            hemisphere: default_hemisphere(),
            storage: StorageSection::default(),
            planning_goals: default_planning_goals(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./garden_data")
}

fn default_hemisphere() -> String {
    "northern".to_string()
}

fn default_planning_goals() -> Vec<String> {
    vec![
        "year-round salad greens".into(),
        "low daily maintenance".into(),
    ]
}

/// [garden.storage] 段：收获去向的容量（harvestOptimizer 的输入）
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_fridge_liters")]
    pub fridge_liters: u32,
    #[serde(default = "default_pantry_liters")]
    pub pantry_liters: u32,
    #[serde(default = "default_freezer_liters")]
    pub freezer_liters: u32,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            fridge_liters: default_fridge_liters(),
            pantry_liters: default_pantry_liters(),
            freezer_liters: default_freezer_liters(),
        }
    }
}

fn default_fridge_liters() -> u32 {
    40
}

fn default_pantry_liters() -> u32 {
    60
}

fn default_freezer_liters() -> u32 {
    25
}

/// [monitoring] 段：巡检周期、Agent 间隔与选取阈值
#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringSection {
    /// 巡检周期（秒）
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// 相邻 Agent 调用之间的固定间隔（秒），对 LLM 限流的背压
    #[serde(default = "default_agent_pacing_secs")]
    pub agent_pacing_secs: u64,
    /// 健康检查超过该天数视为过期
    #[serde(default = "default_health_check_stale_days")]
    pub health_check_stale_days: i64,
    /// 距成熟还有 [0, N] 天时进入收获窗口
    #[serde(default = "default_harvest_window_days")]
    pub harvest_window_days: i64,
    /// 气温较上次缓存变化超过该度数时触发环境分析
    #[serde(default = "default_weather_delta_degrees")]
    pub weather_delta_degrees: f64,
}

impl Default for MonitoringSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            agent_pacing_secs: default_agent_pacing_secs(),
            health_check_stale_days: default_health_check_stale_days(),
            harvest_window_days: default_harvest_window_days(),
            weather_delta_degrees: default_weather_delta_degrees(),
        }
    }
}

fn default_interval_secs() -> u64 {
    1800
}

fn default_agent_pacing_secs() -> u64 {
    2
}

fn default_health_check_stale_days() -> i64 {
    7
}

fn default_harvest_window_days() -> i64 {
    14
}

fn default_weather_delta_degrees() -> f64 {
    10.0
}

/// [permission] 段：delay 后的重提醒间隔
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionSection {
    #[serde(default = "default_reprompt_delay_secs")]
    pub reprompt_delay_secs: u64,
}

impl Default for PermissionSection {
    fn default() -> Self {
        Self {
            reprompt_delay_secs: default_reprompt_delay_secs(),
        }
    }
}

fn default_reprompt_delay_secs() -> u64 {
    3600
}

/// [results] 段：结果历史上限
#[derive(Debug, Clone, Deserialize)]
pub struct ResultsSection {
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
}

impl Default for ResultsSection {
    fn default() -> Self {
        Self {
            history_cap: default_history_cap(),
        }
    }
}

fn default_history_cap() -> usize {
    100
}

/// 从 config 目录加载配置，环境变量 SPROUT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SPROUT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(
                config::File::with_name(name).required(false),
            );
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SPROUT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
