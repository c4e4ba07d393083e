//! Logging and debugging facilities for Horizon Data.
//!
//! This module provides:
//! - Target constants for filtering `tracing` output per subsystem
//! - Tree formatting options shared by hierarchy debug printers
//! - Performance tracing hooks for profiling
//!
//! # Tracing Integration
//!
//! Horizon Data uses the `tracing` crate for instrumentation. To see logs,
//! install a subscriber in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("horizon_data::collection=trace")
//!     .init();
//! ```

/// Span names used throughout Horizon Data for tracing.
pub mod span_names {
    /// Collection change batch span.
    pub const COLLECTION_CHANGE: &str = "horizon_data::collection::change";
    /// Model validation span.
    pub const VALIDATE: &str = "horizon_data::validate";
    /// Data provider fetch span.
    pub const FETCH: &str = "horizon_data::fetch";
}

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Signal/slot system target.
    pub const SIGNAL: &str = "horizon_data_core::signal";
    /// Model attribute and transaction target.
    pub const MODEL: &str = "horizon_data::model";
    /// Collection mutation target.
    pub const COLLECTION: &str = "horizon_data::collection";
    /// Data provider target.
    pub const DATA_PROVIDER: &str = "horizon_data::data_provider";
    /// Validation target.
    pub const VALIDATION: &str = "horizon_data::validation";
    /// Performance spans.
    pub const PERF: &str = "horizon_data::perf";
}

/// Style options for tree visualization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
    /// Compact single-line representation.
    Compact,
}

/// Configuration for tree debug output.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    /// The style of tree visualization.
    pub style: TreeStyle,
    /// Whether to show node IDs.
    pub show_ids: bool,
    /// Whether to show per-node details (sizes, filters).
    pub show_details: bool,
    /// Maximum depth to traverse (None for unlimited).
    pub max_depth: Option<usize>,
    /// Indent size for each level.
    pub indent_size: usize,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_ids: true,
            show_details: true,
            max_depth: None,
            indent_size: 2,
        }
    }
}

impl TreeFormatOptions {
    /// Create options for minimal output.
    pub fn minimal() -> Self {
        Self {
            show_ids: false,
            show_details: false,
            ..Default::default()
        }
    }

    /// Build the prefix string for a tree node at `depth`.
    pub fn prefix(&self, depth: usize, is_last: bool) -> String {
        if depth == 0 {
            return String::new();
        }

        let (branch, tee, corner) = match self.style {
            TreeStyle::Ascii => ("|", "+-- ", "`-- "),
            TreeStyle::Unicode => ("\u{2502}", "\u{251c}\u{2500}\u{2500} ", "\u{2514}\u{2500}\u{2500} "),
            TreeStyle::Compact => ("", "- ", "- "),
        };

        let mut prefix = String::new();
        for _ in 0..(depth - 1) {
            prefix.push_str(branch);
            for _ in 0..self.indent_size {
                prefix.push(' ');
            }
        }
        prefix.push_str(if is_last { corner } else { tee });
        prefix
    }
}

/// A guard that keeps a tracing span entered until dropped.
///
/// Useful for tracking the duration of operations.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!(target: targets::PERF, "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_by_style() {
        let options = TreeFormatOptions {
            style: TreeStyle::Ascii,
            ..Default::default()
        };
        assert_eq!(options.prefix(0, true), "");
        assert_eq!(options.prefix(1, false), "+-- ");
        assert_eq!(options.prefix(2, true), "|  `-- ");

        let unicode = TreeFormatOptions::default();
        assert_eq!(unicode.prefix(1, true), "\u{2514}\u{2500}\u{2500} ");
    }

    #[test]
    fn test_minimal_options() {
        let options = TreeFormatOptions::minimal();
        assert!(!options.show_ids);
        assert!(!options.show_details);
        assert_eq!(options.style, TreeStyle::Unicode);
    }

    #[test]
    fn test_perf_span_without_subscriber() {
        let _span = PerfSpan::new("collection.reset");
    }

    #[test]
    fn test_perf_span_uses_perf_target() {
        use std::sync::Arc;
        use tracing_subscriber::layer::{Context, SubscriberExt};

        struct SpanTargets(Arc<parking_lot::Mutex<Vec<String>>>);

        impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for SpanTargets {
            fn on_new_span(&self, attrs: &tracing::span::Attributes<'_>, _: &tracing::span::Id, _: Context<'_, S>) {
                self.0.lock().push(attrs.metadata().target().to_string());
            }
        }

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(SpanTargets(seen.clone()));
        tracing::subscriber::with_default(subscriber, || {
            let _span = PerfSpan::new("collection.reset");
        });
        assert_eq!(*seen.lock(), vec![targets::PERF.to_string()]);
    }
}
