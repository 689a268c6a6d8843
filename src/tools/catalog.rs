//! The closed set of tools the relay can execute.

use std::fmt;
use std::str::FromStr;

use serde_json::{Value, json};

use crate::error::ToolError;
use crate::types::ToolDefinition;

/// Every tool the model may call, by wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ToolName {
    GenerateImage,
    GenerateAudio,
    SearchWeb,
    SearchWikipedia,
    GetCryptoPrice,
    GetStockPrice,
    GetNftCollection,
    GetWeather,
}

/// Timeout class of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolCategory {
    Media,
    WebSearch,
    Encyclopedia,
    Financial,
    General,
}

impl ToolName {
    pub const ALL: [ToolName; 8] = [
        ToolName::GenerateImage,
        ToolName::GenerateAudio,
        ToolName::SearchWeb,
        ToolName::SearchWikipedia,
        ToolName::GetCryptoPrice,
        ToolName::GetStockPrice,
        ToolName::GetNftCollection,
        ToolName::GetWeather,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GenerateImage => "generateImage",
            Self::GenerateAudio => "generateAudio",
            Self::SearchWeb => "searchWeb",
            Self::SearchWikipedia => "searchWikipedia",
            Self::GetCryptoPrice => "getCryptoPrice",
            Self::GetStockPrice => "getStockPrice",
            Self::GetNftCollection => "getNftCollection",
            Self::GetWeather => "getWeather",
        }
    }

    pub fn category(self) -> ToolCategory {
        match self {
            Self::GenerateImage | Self::GenerateAudio => ToolCategory::Media,
            Self::SearchWeb => ToolCategory::WebSearch,
            Self::SearchWikipedia => ToolCategory::Encyclopedia,
            Self::GetCryptoPrice | Self::GetStockPrice | Self::GetNftCollection => {
                ToolCategory::Financial
            }
            Self::GetWeather => ToolCategory::General,
        }
    }

    fn description(self) -> &'static str {
        match self {
            Self::GenerateImage => "Generate an image from a text prompt and return its URL.",
            Self::GenerateAudio => "Synthesize speech audio from text and return its URL.",
            Self::SearchWeb => "Search the web and return the most relevant results.",
            Self::SearchWikipedia => "Look up a topic in the encyclopedia.",
            Self::GetCryptoPrice => "Get the current price of a cryptocurrency.",
            Self::GetStockPrice => "Get the latest quote for a stock ticker.",
            Self::GetNftCollection => "Get floor price and volume for an NFT collection.",
            Self::GetWeather => "Get the current weather for a location.",
        }
    }

    /// JSON schema of the arguments object.
    pub fn parameters(self) -> Value {
        match self {
            Self::GenerateImage => json!({
                "type": "object",
                "properties": {
                    "prompt": {"type": "string", "description": "What the image should show"},
                    "size": {"type": "string", "enum": ["256x256", "512x512", "1024x1024"]}
                },
                "required": ["prompt"]
            }),
            Self::GenerateAudio => json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string"},
                    "voice": {"type": "string"}
                },
                "required": ["text"]
            }),
            Self::SearchWeb | Self::SearchWikipedia => json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "limit": {"type": "integer", "minimum": 1, "maximum": 20}
                },
                "required": ["query"]
            }),
            Self::GetCryptoPrice | Self::GetStockPrice => json!({
                "type": "object",
                "properties": {
                    "symbol": {"type": "string"},
                    "currency": {"type": "string"}
                },
                "required": ["symbol"]
            }),
            Self::GetNftCollection => json!({
                "type": "object",
                "properties": {
                    "collection": {"type": "string", "description": "Collection slug or contract address"},
                    "chain": {"type": "string"}
                },
                "required": ["collection"]
            }),
            Self::GetWeather => json!({
                "type": "object",
                "properties": {
                    "location": {"type": "string"},
                    "units": {"type": "string", "enum": ["metric", "imperial"]}
                },
                "required": ["location"]
            }),
        }
    }

    pub fn definition(self) -> ToolDefinition {
        ToolDefinition::function(self.as_str(), self.description(), self.parameters())
    }

    /// Check `arguments` against this tool's schema.
    pub fn validate_arguments(self, arguments: &Value) -> Result<(), ToolError> {
        if !arguments.is_object() {
            return Err(ToolError::InvalidArguments {
                tool: self.as_str().to_string(),
                reason: "arguments must be a JSON object".to_string(),
            });
        }
        let schema = self.parameters();
        let validator = match jsonschema::validator_for(&schema) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(tool = self.as_str(), "invalid tool schema: {}", e);
                return Ok(());
            }
        };
        let messages: Vec<String> = validator
            .iter_errors(arguments)
            .take(3)
            .map(|err| err.to_string())
            .collect();
        if messages.is_empty() {
            Ok(())
        } else {
            Err(ToolError::InvalidArguments {
                tool: self.as_str().to_string(),
                reason: messages.join("; "),
            })
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ToolError::UnknownTool(s.to_string()))
    }
}

/// Definitions for every tool, in catalogue order.
pub fn all_definitions() -> Vec<ToolDefinition> {
    ToolName::ALL.into_iter().map(ToolName::definition).collect()
}
