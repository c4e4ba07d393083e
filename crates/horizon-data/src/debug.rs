//! Debug visualization of collection hierarchies.
//!
//! ```
//! use horizon_data::collection::{Collection, CollectionConfig};
//! use horizon_data::debug::CollectionTreeDebug;
//! use horizon_data_core::TreeFormatOptions;
//!
//! let root = Collection::with_entries(CollectionConfig::raw().with_name("numbers"), [1, 2, 3]).unwrap();
//! let _child = root.create_child(None).unwrap();
//!
//! let text = CollectionTreeDebug::with_options(TreeFormatOptions::minimal()).format_tree(&root);
//! assert_eq!(text, "numbers\n\u{2514}\u{2500}\u{2500} numbers\n");
//! ```

use std::fmt::Write as FmtWrite;

use horizon_data_core::TreeFormatOptions;

use crate::collection::Collection;

/// Renders a collection and its children as an indented tree.
#[derive(Debug, Clone, Default)]
pub struct CollectionTreeDebug {
    options: TreeFormatOptions,
}

impl CollectionTreeDebug {
    /// Create a visualizer with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a visualizer with custom options.
    pub fn with_options(options: TreeFormatOptions) -> Self {
        Self { options }
    }

    /// Format `root` and everything derived from it.
    pub fn format_tree(&self, root: &Collection) -> String {
        let mut output = String::new();
        self.format_subtree_into(root, 0, true, &mut output);
        output
    }

    fn format_subtree_into(&self, collection: &Collection, depth: usize, is_last: bool, output: &mut String) {
        if self.options.max_depth.is_some_and(|max| depth > max) {
            return;
        }

        output.push_str(&self.options.prefix(depth, is_last));
        output.push_str(collection.config().name.as_deref().unwrap_or("(unnamed)"));
        if self.options.show_ids {
            let _ = write!(output, " [{}]", collection.id());
        }
        if self.options.show_details {
            let _ = write!(output, " ({} entries", collection.len());
            if collection.has_filter() {
                output.push_str(", filtered");
            }
            if collection.is_editing() {
                output.push_str(", editing");
            }
            output.push(')');
        }
        output.push('\n');

        let children = collection.children();
        let count = children.len();
        for (i, child) in children.iter().enumerate() {
            self.format_subtree_into(child, depth + 1, i + 1 == count, output);
        }
    }
}
