//! Host event bindings.
//!
//! Maps each lifecycle event the host delivers to the immediate or the
//! debounced purge path. Bindings are built once by the composition root.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::error::PurgeError;
use super::scheduler::ScheduleOutcome;
use super::trigger::PurgeTrigger;

/// Argument value that marks the options page in an `options-saved` event.
const OPTIONS_POST_ID: &str = "options";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostEvent {
    PackageInstalled,
    PluginActivated,
    PluginDeactivated,
    ThemeSwitched,
    BuilderCacheCleared,
    BuilderLayoutSaved,
    BuilderTemplateSaved,
    OptionsSaved,
    ContentSaved,
    MetaUpdated,
}

impl HostEvent {
    pub const ALL: [HostEvent; 10] = [
        HostEvent::PackageInstalled,
        HostEvent::PluginActivated,
        HostEvent::PluginDeactivated,
        HostEvent::ThemeSwitched,
        HostEvent::BuilderCacheCleared,
        HostEvent::BuilderLayoutSaved,
        HostEvent::BuilderTemplateSaved,
        HostEvent::OptionsSaved,
        HostEvent::ContentSaved,
        HostEvent::MetaUpdated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HostEvent::PackageInstalled => "package-installed",
            HostEvent::PluginActivated => "plugin-activated",
            HostEvent::PluginDeactivated => "plugin-deactivated",
            HostEvent::ThemeSwitched => "theme-switched",
            HostEvent::BuilderCacheCleared => "builder-cache-cleared",
            HostEvent::BuilderLayoutSaved => "builder-layout-saved",
            HostEvent::BuilderTemplateSaved => "builder-template-saved",
            HostEvent::OptionsSaved => "options-saved",
            HostEvent::ContentSaved => "content-saved",
            HostEvent::MetaUpdated => "meta-updated",
        }
    }

    /// Events raised by the page builder; only bound while it is loaded.
    pub fn is_builder_event(self) -> bool {
        matches!(
            self,
            HostEvent::BuilderCacheCleared
                | HostEvent::BuilderLayoutSaved
                | HostEvent::BuilderTemplateSaved
        )
    }
}

impl fmt::Display for HostEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown host event `{0}`")]
pub struct UnknownEvent(pub String);

impl FromStr for HostEvent {
    type Err = UnknownEvent;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        HostEvent::ALL
            .into_iter()
            .find(|event| event.as_str() == value)
            .ok_or_else(|| UnknownEvent(value.to_string()))
    }
}

/// Path taken by builder events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuilderEventPolicy {
    Immediate,
    #[default]
    Debounced,
}

impl FromStr for BuilderEventPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(Self::Immediate),
            "debounced" => Ok(Self::Debounced),
            other => Err(format!("expected `immediate` or `debounced`, got `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Immediate,
    Debounced(ScheduleOutcome),
    Ignored,
}

impl DispatchOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            DispatchOutcome::Immediate => "immediate",
            DispatchOutcome::Debounced(_) => "debounced",
            DispatchOutcome::Ignored => "ignored",
        }
    }
}

#[derive(Clone)]
pub struct EventBindings {
    trigger: PurgeTrigger,
    builder_policy: BuilderEventPolicy,
}

impl EventBindings {
    pub fn new(trigger: PurgeTrigger, builder_policy: BuilderEventPolicy) -> Self {
        Self {
            trigger,
            builder_policy,
        }
    }

    pub fn trigger(&self) -> &PurgeTrigger {
        &self.trigger
    }

    /// Route one host event to its purge path.
    ///
    /// `args` are whatever the host attached to the event; only `options-saved`
    /// inspects them, everything else just logs them.
    pub async fn dispatch(
        &self,
        event: HostEvent,
        args: &[Value],
    ) -> Result<DispatchOutcome, PurgeError> {
        let logged_args = Value::from(args.to_vec());
        debug!(
            target = "purgekeeper::bindings",
            event = event.as_str(),
            args = %logged_args,
            "host event received"
        );

        let log = self.trigger.orchestrator().log();

        if event.is_builder_event() {
            if !self.trigger.orchestrator().builder_available().await {
                log.write(format!("{event} ignored, page builder not present."));
                return Ok(DispatchOutcome::Ignored);
            }
            return match self.builder_policy {
                BuilderEventPolicy::Immediate => self.immediate(event).await,
                BuilderEventPolicy::Debounced => Ok(self.debounced(event)),
            };
        }

        match event {
            HostEvent::OptionsSaved => {
                let post_id = args.first().and_then(Value::as_str);
                if post_id != Some(OPTIONS_POST_ID) {
                    return Ok(DispatchOutcome::Ignored);
                }
                log.write("options page saved, clearing builder asset cache.");
                self.clear_builder_assets().await?;
                self.immediate(event).await
            }
            HostEvent::MetaUpdated => Ok(self.debounced(event)),
            _ => self.immediate(event).await,
        }
    }

    async fn immediate(&self, event: HostEvent) -> Result<DispatchOutcome, PurgeError> {
        self.trigger.purge_now(event.as_str()).await?;
        Ok(DispatchOutcome::Immediate)
    }

    fn debounced(&self, event: HostEvent) -> DispatchOutcome {
        DispatchOutcome::Debounced(self.trigger.request_purge(event.as_str()))
    }

    async fn clear_builder_assets(&self) -> Result<(), PurgeError> {
        for purger in self.trigger.orchestrator().builder_purgers() {
            if purger.is_available().await {
                purger.purge_all().await?;
            }
        }
        Ok(())
    }
}
