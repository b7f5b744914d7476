//! 花园侧数据：快照构建、持久化存储、天气数据源

pub mod snapshot;
pub mod store;
pub mod weather;

pub use snapshot::{CareLogEntry, GardenSnapshot, PlantSnapshot, CARE_LOG_RECENT};
pub use store::{
    FileGardenStore, GardenDocument, GardenStore, GardenUpdate, MemoryGardenStore, PlantRecord,
    ScheduleAdjustment,
};
pub use weather::{
    ForecastDay, HttpWeatherProvider, WeatherCache, WeatherProvider, WeatherSnapshot,
};
