//! Model edit transactions.
//!
//! Writes inside an open transaction accumulate in [`EditState`]; observers
//! are notified once, when the outermost level closes.

use std::sync::Arc;

use horizon_data_core::logging::targets;
use horizon_data_core::Result;
use indexmap::IndexMap;

use super::{AttributeChange, ChangeEvent, Model, ModelTopic};
use crate::reentrancy::{self, DepthGuard};
use crate::value::Value;

#[derive(Default)]
pub(super) struct EditState {
    level: usize,
    changes: IndexMap<String, AttributeChange>,
    sub_models: Vec<Model>,
}

impl EditState {
    /// Record a write. A value written back to its pre-transaction state
    /// drops out of the change set.
    pub(super) fn record(&mut self, name: &str, old: Value, new: Value) {
        match self.changes.get_mut(name) {
            Some(change) if change.old == new => {
                self.changes.shift_remove(name);
            }
            Some(change) => change.new = new,
            None => {
                self.changes.insert(name.to_string(), AttributeChange { old, new });
            }
        }
    }
}

/// An open model transaction. Dropping the scope closes it.
///
/// Obtained from [`Model::edit`]. If the scope is dropped while panicking,
/// the transaction is rolled back instead of committed.
#[must_use = "the transaction closes as soon as the scope is dropped"]
pub struct EditScope {
    model: Model,
}

impl Drop for EditScope {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.model.cancel_edit();
        } else {
            self.model.end_edit();
        }
    }
}

impl Model {
    /// Open a transaction closed by dropping the returned scope.
    ///
    /// # Errors
    ///
    /// [`Error::Reentrancy`](horizon_data_core::Error::Reentrancy) when this
    /// model is already [`MAX_REENTRANT_DEPTH`](crate::reentrancy::MAX_REENTRANT_DEPTH)
    /// emissions deep.
    pub fn edit(&self) -> Result<EditScope> {
        self.begin_edit()?;
        Ok(EditScope { model: self.clone() })
    }

    /// Open (or deepen) a transaction. Every successful call must be paired
    /// with [`end_edit`](Self::end_edit) or [`cancel_edit`](Self::cancel_edit).
    pub fn begin_edit(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.edit.level == 0 {
            if let Err(e) = reentrancy::check(&self.inner.emit_depth) {
                drop(state);
                tracing::error!(target: targets::MODEL, model = %self, error = %e, "refusing re-entrant transaction");
                return Err(e);
            }
        }
        state.edit.level += 1;
        Ok(())
    }

    /// Whether a transaction is open.
    pub fn is_editing(&self) -> bool {
        self.inner.state.lock().edit.level > 0
    }

    /// Close one transaction level. Closing the outermost level commits
    /// enlisted sub-models and emits one `change:<attr>` event per changed
    /// attribute followed by one `change` event.
    pub fn end_edit(&self) {
        let (changes, sub_models) = {
            let mut state = self.inner.state.lock();
            match state.edit.level {
                0 => return,
                1 => {
                    state.edit.level = 0;
                    (
                        std::mem::take(&mut state.edit.changes),
                        std::mem::take(&mut state.edit.sub_models),
                    )
                }
                _ => {
                    state.edit.level -= 1;
                    return;
                }
            }
        };

        for sub in &sub_models {
            sub.end_edit();
        }
        if changes.is_empty() {
            return;
        }
        self.emit_changes(changes);
    }

    /// Close one transaction level. Cancelling the outermost level restores
    /// every changed attribute, cancels enlisted sub-models and emits nothing.
    pub fn cancel_edit(&self) {
        let (changes, sub_models) = {
            let mut state = self.inner.state.lock();
            match state.edit.level {
                0 => return,
                1 => {
                    state.edit.level = 0;
                    (
                        std::mem::take(&mut state.edit.changes),
                        std::mem::take(&mut state.edit.sub_models),
                    )
                }
                _ => {
                    state.edit.level -= 1;
                    return;
                }
            }
        };

        for sub in &sub_models {
            sub.cancel_edit();
        }
        for (name, change) in changes {
            let restored = {
                let mut state = self.inner.state.lock();
                match state.attributes.get_mut(&name) {
                    Some(slot) => {
                        *slot = change.old.clone();
                        true
                    }
                    None => false,
                }
            };
            if restored {
                self.relink(&name, &change.old);
            }
        }
        tracing::trace!(target: targets::MODEL, model = %self, "transaction cancelled");
    }

    /// Register `sub` as touched by the open transaction, opening a
    /// transaction on it the first time.
    pub(super) fn enlist(&self, sub: &Model) {
        let mut state = self.inner.state.lock();
        if state.edit.level == 0 || state.edit.sub_models.iter().any(|m| m.ptr_eq(sub)) {
            return;
        }
        // An enlisted sub-model at its own depth limit still accepts writes;
        // its handlers are refused later.
        state.edit.sub_models.push(sub.clone());
        drop(state);
        sub.inner.state.lock().edit.level += 1;
    }

    fn emit_changes(&self, changes: IndexMap<String, AttributeChange>) {
        let changes = Arc::new(changes);
        let event = ChangeEvent::new(self.clone(), None, changes.clone());
        tracing::trace!(
            target: targets::MODEL,
            model = %self,
            attributes = ?event.changed_attributes(),
            "committing transaction"
        );

        let _depth = DepthGuard::enter(&self.inner.emit_depth);
        for name in changes.keys() {
            self.inner
                .events
                .emit(&ModelTopic::attribute(name.clone()), event.for_attribute(name));
        }
        self.inner.events.emit(&ModelTopic::Change, event.clone());
        self.bubble_nested(event);
    }
}
