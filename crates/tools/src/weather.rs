//! Weather tool — returns deterministic mock weather for a city.
//!
//! The agent loop only needs something plausible to reason over, so the
//! numbers are derived from a hash of the city name instead of a live API.

use async_trait::async_trait;
use serde::Serialize;
use toolloop_core::error::ToolError;
use toolloop_core::tool::Tool;

pub struct GetWeatherTool;

#[async_trait]
impl Tool for GetWeatherTool {
    fn name(&self) -> &str {
        "getWeather"
    }

    fn description(&self) -> &str {
        "Get the current weather for a city. Returns temperature, conditions, humidity and wind."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "Name of the city, e.g. \"Warsaw\""
                },
                "units": {
                    "type": "string",
                    "enum": ["metric", "imperial"],
                    "description": "Temperature units (default: metric)"
                }
            },
            "required": ["city"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let city = arguments["city"].as_str().unwrap_or_default().trim();
        if city.is_empty() {
            return Err(ToolError::InvalidArguments("'city' must not be empty".into()));
        }

        let units = match arguments["units"].as_str() {
            None | Some("metric") => Units::Metric,
            Some("imperial") => Units::Imperial,
            Some(other) => {
                return Err(ToolError::InvalidArguments(format!(
                    "unknown units '{other}', expected 'metric' or 'imperial'"
                )));
            }
        };

        let report = mock_weather(city, units);
        serde_json::to_value(&report).map_err(|e| ToolError::failed(self.name(), e.to_string()))
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Units {
    Metric,
    Imperial,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WeatherReport {
    city: String,
    temperature: f64,
    unit: &'static str,
    conditions: &'static str,
    humidity: u32,
    wind_speed: f64,
}

const CONDITIONS: [&str; 8] = [
    "Clear skies",
    "Partly cloudy",
    "Overcast",
    "Light rain",
    "Heavy rain",
    "Thunderstorms",
    "Snow",
    "Foggy",
];

fn mock_weather(city: &str, units: Units) -> WeatherReport {
    // Case-insensitive so "warsaw" and "Warsaw" agree.
    let hash: u32 = city
        .to_lowercase()
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));

    let celsius = ((hash % 40) as f64) - 5.0;
    let (temperature, unit) = match units {
        Units::Metric => (celsius, "°C"),
        Units::Imperial => (celsius * 9.0 / 5.0 + 32.0, "°F"),
    };

    WeatherReport {
        city: city.to_string(),
        temperature: (temperature * 10.0).round() / 10.0,
        unit,
        conditions: CONDITIONS[(hash as usize / 7) % CONDITIONS.len()],
        humidity: 30 + (hash % 60),
        wind_speed: ((hash % 30) as f64) + 5.0,
    }
}
