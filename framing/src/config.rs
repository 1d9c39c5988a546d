//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Framing configuration

/// Default upper bound on a single frame payload
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 1024 * 1024;

/// Length-prefixed framing settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramingConfig {
    /// Largest payload a single frame may carry
    ///
    /// A header announcing more than this is treated as malformed input.
    pub max_frame_length: usize,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

impl FramingConfig {
    /// Set the maximum frame payload length
    pub fn with_max_frame_length(mut self, length: usize) -> Self {
        self.max_frame_length = length;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_frame_length == 0 {
            return Err("max_frame_length must be greater than 0".to_string());
        }
        if self.max_frame_length > u32::MAX as usize {
            return Err("max_frame_length must fit in a 32-bit length header".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(FramingConfig::default().validate().is_ok());
        assert!(
            FramingConfig::default()
                .with_max_frame_length(0)
                .validate()
                .is_err()
        );
    }
}
