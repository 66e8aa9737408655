//! Typed view of the manifest documents handed to the CLI.

use std::path::PathBuf;

use kubelab_core::{Document, Error, Result};
use kubelab_reconciler::{Account, Classroom, Managed};
use tracing::warn;

/// Accounts and classrooms declared across a set of manifest files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifests {
    pub accounts: Vec<Account>,
    pub classrooms: Vec<Classroom>,
}

impl Manifests {
    /// Sort documents by kind. Unknown kinds are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if a known document does not decode or has no name.
    pub fn from_documents(documents: &[Document]) -> Result<Self> {
        let mut manifests = Self::default();
        for (index, document) in documents.iter().enumerate() {
            match document.kind.as_str() {
                kind if kind == Account::KIND => manifests.accounts.push(named(index, document.decode::<Account>()?)?),
                kind if kind == Classroom::KIND => manifests.classrooms.push(named(index, document.decode::<Classroom>()?)?),
                other => warn!(kind = other, index, "Skipping document of unknown kind"),
            }
        }
        Ok(manifests)
    }

    /// Load and merge every manifest file.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first file that cannot be read or decoded.
    pub fn load(paths: &[PathBuf]) -> Result<Self> {
        let mut merged = Self::default();
        for path in paths {
            let documents = kubelab_core::manifest::load_documents(path)?;
            let mut loaded = Self::from_documents(&documents)?;
            merged.accounts.append(&mut loaded.accounts);
            merged.classrooms.append(&mut loaded.classrooms);
        }
        Ok(merged)
    }

    pub fn len(&self) -> usize {
        self.accounts.len().saturating_add(self.classrooms.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn named<O: Managed>(index: usize, object: O) -> Result<O> {
    if object.name().trim().is_empty() {
        return Err(Error::invalid_document(index, "metadata.name must not be empty"));
    }
    Ok(object)
}
