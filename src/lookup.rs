//! Phonebook lookup as a four-stage pipeline:
//!
//! ```text
//! grep NAME PHONEBOOK | sed 's/ /#/g' | sed 's/,/ /' | awk '{print $2}'
//! ```
//!
//! Entries look like `Full Name,054-5531415`. Spaces in the name become `#`
//! so the comma can turn into the only field separator awk sees.

use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::stage::Stage;

pub const DEFAULT_PHONEBOOK: &str = "phonebook.txt";

/// Letters, spaces and apostrophes only. The name reaches grep as a single
/// argv entry, this just keeps it from being read as a flag or a regex.
pub fn is_valid_name(name: &str) -> bool {
    !name.trim().is_empty()
        && name
            .chars()
            .all(|c| c.is_alphabetic() || c == ' ' || c == '\'')
}

/// The phonebook path must be valid UTF-8: it is passed to grep verbatim
/// and a lossy conversion would make grep open a different file.
pub fn lookup_stages(name: &str, phonebook: &Path) -> Result<Vec<Stage>> {
    if !is_valid_name(name) {
        return Err(PipelineError::validation(format!(
            "invalid name {name:?}: name must contain letters, spaces or apostrophes only"
        )));
    }
    let Some(phonebook) = phonebook.to_str() else {
        return Err(PipelineError::validation(format!(
            "phonebook path {phonebook:?} is not valid UTF-8"
        )));
    };

    Ok(vec![
        Stage::new("grep").arg(name).arg(phonebook),
        Stage::new("sed").arg("s/ /#/g"),
        Stage::new("sed").arg("s/,/ /"),
        Stage::new("awk").arg("{print $2}"),
    ])
}
