//! Wire and working representations of a message.
//!
//! The engine operates on a [`WorkingDocument`]. A [`DocumentScope`] owns the
//! working form for the length of one `process` call and writes the wire form
//! back on [`DocumentScope::restore`]. Nothing is shared between calls.

use tracing::trace;

use crate::error::ProcessingError;
use crate::message::Envelope;

/// Working form of a message, mutated in place by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingDocument {
    envelope: Envelope,
    processed: Vec<String>,
}

impl WorkingDocument {
    /// Wraps an envelope
    #[must_use]
    pub const fn new(envelope: Envelope) -> Self {
        Self {
            envelope,
            processed: Vec::new(),
        }
    }

    /// Current envelope
    #[must_use]
    pub const fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Mutable envelope, e.g. for in-place decryption
    pub fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }

    /// Records that the element with this `wsu:Id` has been processed
    pub fn mark_processed(&mut self, id: impl Into<String>) {
        self.processed.push(id.into());
    }

    /// Ids of processed elements, in processing order
    #[must_use]
    pub fn processed(&self) -> &[String] {
        &self.processed
    }

    /// Consumes the document, returning the envelope
    #[must_use]
    pub fn into_envelope(self) -> Envelope {
        self.envelope
    }
}

/// Converts between wire and working representations.
pub trait RepresentationConverter: Send + Sync {
    /// Builds the working form of an envelope.
    ///
    /// # Errors
    ///
    /// Returns a representation error when the envelope cannot be converted.
    fn to_working_form(&self, envelope: &Envelope) -> Result<WorkingDocument, ProcessingError>;

    /// Converts a working document back to wire form.
    ///
    /// # Errors
    ///
    /// Returns a representation error when the document cannot be converted.
    fn to_wire_form(&self, document: WorkingDocument) -> Result<Envelope, ProcessingError>;
}

/// Converter whose working form is a structural copy of the envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityConverter;

impl RepresentationConverter for IdentityConverter {
    fn to_working_form(&self, envelope: &Envelope) -> Result<WorkingDocument, ProcessingError> {
        Ok(WorkingDocument::new(envelope.clone()))
    }

    fn to_wire_form(&self, document: WorkingDocument) -> Result<Envelope, ProcessingError> {
        Ok(document.into_envelope())
    }
}

/// Call-scoped ownership of a working document.
///
/// Dropping a scope without calling [`restore`](Self::restore) discards the
/// working form; the caller's envelope is left as it was on entry.
#[must_use = "a document scope must be restored to write the wire form back"]
pub struct DocumentScope<'a> {
    converter: &'a dyn RepresentationConverter,
    document: WorkingDocument,
}

impl<'a> DocumentScope<'a> {
    /// Converts `envelope` to working form.
    ///
    /// # Errors
    ///
    /// Propagates converter failures.
    pub fn enter(
        converter: &'a dyn RepresentationConverter,
        envelope: &Envelope,
    ) -> Result<Self, ProcessingError> {
        let document = converter.to_working_form(envelope)?;
        trace!("Entered working representation");
        Ok(Self {
            converter,
            document,
        })
    }

    /// The working document
    #[must_use]
    pub const fn document(&self) -> &WorkingDocument {
        &self.document
    }

    /// The working document, mutably
    pub fn document_mut(&mut self) -> &mut WorkingDocument {
        &mut self.document
    }

    /// Converts the working document back to wire form.
    ///
    /// # Errors
    ///
    /// Propagates converter failures.
    pub fn restore(self) -> Result<Envelope, ProcessingError> {
        let envelope = self.converter.to_wire_form(self.document)?;
        trace!("Restored wire representation");
        Ok(envelope)
    }
}

impl std::fmt::Debug for DocumentScope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentScope")
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}
