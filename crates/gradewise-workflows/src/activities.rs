// Copyright (C) 2025 Gradewise contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Greeting activities.

use gradewise_sdk::{ActivityContext, ActivityError, ActivityRegistryBuilder};
use tracing::debug;

pub const GREET: &str = "Greet";
pub const SAY_GOODBYE: &str = "SayGoodbye";

/// Default greeting when none is configured.
pub const DEFAULT_LOCAL_GREETING: &str = "Hello";

/// Activities sharing the greeting injected at worker construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GreetingActivities {
    pub local_greeting: String,
}

impl Default for GreetingActivities {
    fn default() -> Self {
        Self::new(DEFAULT_LOCAL_GREETING)
    }
}

impl GreetingActivities {
    pub fn new(local_greeting: impl Into<String>) -> Self {
        Self {
            local_greeting: local_greeting.into(),
        }
    }

    /// `"{local_greeting}, {name}!"`
    pub fn greet(&self, name: &str) -> Result<String, ActivityError> {
        Ok(format!("{}, {}!", self.local_greeting, name))
    }

    pub fn say_goodbye(&self) -> Result<String, ActivityError> {
        Ok("Goodbye!".to_string())
    }

    /// Register `Greet` and `SayGoodbye`.
    pub fn register(self, builder: ActivityRegistryBuilder) -> ActivityRegistryBuilder {
        let greeter = self.clone();
        builder
            .register_typed(GREET, move |ctx: ActivityContext, name: String| {
                let greeter = greeter.clone();
                async move {
                    debug!(run_id = %ctx.run_id, attempt = ctx.attempt, "Greeting");
                    greeter.greet(&name)
                }
            })
            .register_typed(SAY_GOODBYE, move |ctx: ActivityContext, _: ()| {
                let activities = self.clone();
                async move {
                    debug!(run_id = %ctx.run_id, attempt = ctx.attempt, "Saying goodbye");
                    activities.say_goodbye()
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greet_uses_local_greeting() {
        assert_eq!(GreetingActivities::default().greet("Sam").unwrap(), "Hello, Sam!");
        assert_eq!(
            GreetingActivities::new("おはよ").greet("Sam").unwrap(),
            "おはよ, Sam!"
        );
    }

    #[test]
    fn test_say_goodbye() {
        assert_eq!(GreetingActivities::default().say_goodbye().unwrap(), "Goodbye!");
    }
}
