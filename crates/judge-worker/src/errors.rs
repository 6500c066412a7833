// Copyright 2026 CARP Judge Worker contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;

/// A transport-level failure in the control plane: disconnects, login failures, and WebSocket
/// errors all collapse to this one variant since they are all handled identically (cancel the
/// connection's task group, back off, retry).
#[derive(Debug)]
pub struct ControlPlaneError {
    message: String,
}

impl ControlPlaneError {
    pub fn new(message: impl Into<String>) -> Self {
        ControlPlaneError {
            message: message.into(),
        }
    }
}

impl fmt::Display for ControlPlaneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ControlPlaneError {}

macro_rules! impl_from_display_error {
    ($src:ty) => {
        impl From<$src> for ControlPlaneError {
            fn from(err: $src) -> Self {
                ControlPlaneError::new(err.to_string())
            }
        }
    };
}

impl_from_display_error!(reqwest::Error);
impl_from_display_error!(tokio_tungstenite::tungstenite::Error);
impl_from_display_error!(serde_json::Error);
impl_from_display_error!(std::io::Error);
