//! Engine-facing traits.

use crate::error::DocError;

/// Receives the bytes of every update a document emits for local edits.
pub type UpdateCallback = Box<dyn FnMut(&[u8]) + Send>;

/// One replica of a text document.
///
/// Positions and lengths count characters, not bytes.
pub trait TextDocument: Send {
    /// Insert `text` before the character at `pos`.
    fn insert_text(&mut self, pos: usize, text: &str) -> Result<(), DocError>;

    /// Delete `len` characters starting at `pos`.
    fn delete_text(&mut self, pos: usize, len: usize) -> Result<(), DocError>;

    /// Merge update bytes produced by another replica.
    ///
    /// Applying an update that was already applied has no effect. Remote
    /// updates never trigger the update callback.
    fn apply_update(&mut self, update: &[u8]) -> Result<(), DocError>;

    /// Current visible text.
    fn text(&self) -> String;

    /// Visible length in characters.
    fn len(&self) -> usize {
        self.text().chars().count()
    }

    /// True when the visible text is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encode the full document state.
    fn encode_state(&self) -> Result<Vec<u8>, DocError>;

    /// Run `f` as one transaction: all of its edits are emitted as a
    /// single update when it returns. Edits made before `f` fails are kept
    /// and still emitted.
    fn transact(
        &mut self,
        f: &mut dyn FnMut(&mut dyn TextDocument) -> Result<(), DocError>,
    ) -> Result<(), DocError>;
}

/// Creates documents of one engine.
pub trait DocumentFactory: Send + Sync {
    /// Engine name, used in reports.
    fn name(&self) -> &'static str;

    /// A new empty replica.
    fn create(&self, on_update: UpdateCallback) -> Box<dyn TextDocument>;

    /// A new replica initialized from [`TextDocument::encode_state`] output.
    fn load(&self, on_update: UpdateCallback, state: &[u8])
        -> Result<Box<dyn TextDocument>, DocError>;
}
