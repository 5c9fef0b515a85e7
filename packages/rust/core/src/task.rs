//! The per-row unit of work: reference text → prompt → completion → cleanup.

use std::sync::Arc;

use colgen_provider::ProviderAdapter;
use colgen_sanitize::Sanitizer;
use colgen_shared::{ProviderError, RowView};
use colgen_template::{REFERENCE_VAR, REFERENCE_VAR_ALIAS, VariableSet, substitute};

/// What a finished row produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowOutput {
    pub row: usize,
    /// The `column: value` block the prompt was built from.
    pub reference: String,
    /// Rendered prompt sent to the provider.
    pub prompt: String,
    /// Sanitized completion.
    pub text: String,
}

/// Everything a row needs besides the row itself. Shared read-only by workers.
#[derive(Debug)]
pub(crate) struct RowTask {
    pub(crate) template: String,
    pub(crate) columns: Vec<usize>,
    pub(crate) provider: ProviderAdapter,
    pub(crate) sanitizer: Arc<Sanitizer>,
}

impl RowTask {
    pub(crate) async fn run(&self, view: &RowView) -> Result<RowOutput, ProviderError> {
        let reference = view.reference_text();
        let prompt = substitute(&self.template, &row_variables(view, &reference));
        let raw = self.provider.complete(&prompt).await?;
        let text = self.sanitizer.sanitize(&raw, &prompt);
        Ok(RowOutput {
            row: view.index,
            reference,
            prompt,
            text,
        })
    }
}

/// Variables for one row: the reference block under both names, plus each
/// selected column under its own name.
pub fn row_variables(view: &RowView, reference: &str) -> VariableSet {
    let mut vars: VariableSet = view.fields.iter().cloned().collect();
    vars.insert(REFERENCE_VAR.to_string(), reference.to_string());
    vars.insert(REFERENCE_VAR_ALIAS.to_string(), reference.to_string());
    vars
}
