//! Stream topic strings.
//!
//! Topics follow `title[.depth][.symbol]`: `publicTrade.BTCUSDT` for
//! trades, `orderbook.50.BTCUSDT` for a depth-limited book.

use std::fmt;

use crate::provider::error::ProviderError;

/// A parsed subscription topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    pub title: String,
    pub depth: Option<u32>,
    pub symbol: Option<String>,
}

impl Topic {
    pub fn trade(symbol: impl Into<String>) -> Self {
        Self {
            title: "publicTrade".to_string(),
            depth: None,
            symbol: Some(symbol.into()),
        }
    }

    pub fn orderbook(depth: u32, symbol: impl Into<String>) -> Self {
        Self {
            title: "orderbook".to_string(),
            depth: Some(depth),
            symbol: Some(symbol.into()),
        }
    }

    /// Parse a dotted topic string.
    pub fn parse(s: &str) -> Result<Self, ProviderError> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(ProviderError::Topic(s.to_string()));
        }
        match parts.as_slice() {
            [title] => Ok(Self {
                title: title.to_string(),
                depth: None,
                symbol: None,
            }),
            [title, symbol] => Ok(Self {
                title: title.to_string(),
                depth: None,
                symbol: Some(symbol.to_string()),
            }),
            [title, depth, symbol] => {
                let depth = depth
                    .parse()
                    .map_err(|_| ProviderError::Topic(s.to_string()))?;
                Ok(Self {
                    title: title.to_string(),
                    depth: Some(depth),
                    symbol: Some(symbol.to_string()),
                })
            }
            _ => Err(ProviderError::Topic(s.to_string())),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)?;
        if let Some(depth) = self.depth {
            write!(f, ".{depth}")?;
        }
        if let Some(symbol) = &self.symbol {
            write!(f, ".{symbol}")?;
        }
        Ok(())
    }
}
