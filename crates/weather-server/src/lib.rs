pub mod server;
pub mod weather;

pub use server::{WeatherServer, SERVER_NAME, TOOL_NAME};
pub use weather::{format_weather, format_weather_str, WeatherClient, WeatherConfig};
