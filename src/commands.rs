//! Command dispatch
//!
//! The surface surrounding tools consume: the caller builds a command
//! value and invokes `process`. List-style commands return strings;
//! transforming commands write to the output sink. A command either
//! completes or returns a single terminal error; partial lists are
//! discarded.

use crate::config::{CancelFlag, Configuration};
use crate::document::Document;
use crate::encryption::Permissions;
use crate::error::{PdfError, Result};
use crate::pages::{insert_blank_page, remove_pages, PageSelection};
use crate::validator;
use crate::writer;
use std::path::PathBuf;

/// Source of the document bytes.
#[derive(Debug, Clone)]
pub enum Input {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// Destination for transforming commands.
#[derive(Debug, Clone)]
pub enum Output {
    Path(PathBuf),
    Memory,
}

/// One operation over one document.
#[derive(Debug, Clone)]
pub enum Command {
    PageCount {
        input: Input,
    },
    ListInfo {
        input: Input,
    },
    ListAnnotations {
        input: Input,
    },
    Validate {
        input: Input,
    },
    Optimize {
        input: Input,
        output: Output,
    },
    /// Remove the selected pages.
    Trim {
        input: Input,
        output: Output,
        selection: String,
    },
    /// Insert an empty page before the 1-based position.
    InsertPage {
        input: Input,
        output: Output,
        before: u32,
    },
    Encrypt {
        input: Input,
        output: Output,
        permissions: Permissions,
    },
    Decrypt {
        input: Input,
        output: Output,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    /// Result of a list-style command.
    List(Vec<String>),
    /// Bytes produced for `Output::Memory`.
    Bytes(Vec<u8>),
    /// Written to the `Output::Path` destination.
    Saved,
}

pub fn process(command: Command, config: Configuration) -> Result<CommandOutput> {
    process_with_cancel(command, config, &CancelFlag::new())
}

pub fn process_with_cancel(
    command: Command,
    config: Configuration,
    cancel: &CancelFlag,
) -> Result<CommandOutput> {
    match command {
        Command::PageCount { input } => {
            let mut doc = load(input, config)?;
            Ok(CommandOutput::List(vec![doc.page_count()?.to_string()]))
        }
        Command::ListInfo { input } => {
            let mut doc = load(input, config)?;
            Ok(CommandOutput::List(list_info(&mut doc)?))
        }
        Command::ListAnnotations { input } => {
            let mut doc = load(input, config)?;
            let report = validator::validate(&mut doc, cancel)?;
            let mut lines = Vec::new();
            for (page, by_subtype) in &report.page_annots {
                for ids in by_subtype.values() {
                    for id in ids {
                        let summary = validator::annotation_summary(&mut doc, *id)?;
                        lines.push(format!("page {page}: {summary}"));
                    }
                }
            }
            Ok(CommandOutput::List(lines))
        }
        Command::Validate { input } => {
            let mut doc = load(input, config)?;
            let report = validator::validate(&mut doc, cancel)?;
            Ok(CommandOutput::List(report.warnings))
        }
        Command::Optimize { input, output } => {
            let mut doc = load(input, config)?;
            crate::optimizer::optimize(&mut doc, cancel)?;
            write(&mut doc, output, cancel)
        }
        Command::Trim {
            input,
            output,
            selection,
        } => {
            let mut doc = load(input, config)?;
            let selection = PageSelection::parse(&selection)?;
            let count = doc.page_count()? as u32;
            let selected = selection.resolve(count, doc.config().validation)?;
            remove_pages(&mut doc, &selected)?;
            write(&mut doc, output, cancel)
        }
        Command::InsertPage {
            input,
            output,
            before,
        } => {
            let mut doc = load(input, config)?;
            insert_blank_page(&mut doc, before)?;
            write(&mut doc, output, cancel)
        }
        Command::Encrypt {
            input,
            output,
            permissions,
        } => {
            let (user_pw, owner_pw) = (
                config.user_password.clone(),
                config.owner_password.clone(),
            );
            if user_pw.is_empty() && owner_pw.is_empty() {
                return Err(PdfError::PasswordRequired);
            }
            let mut doc = load(input, config)?;
            doc.enable_encryption(&user_pw, &owner_pw, permissions)?;
            write(&mut doc, output, cancel)
        }
        Command::Decrypt { input, output } => {
            let mut doc = load(input, config)?;
            doc.disable_encryption()?;
            write(&mut doc, output, cancel)
        }
    }
}

fn load(input: Input, config: Configuration) -> Result<Document> {
    match input {
        Input::Path(path) => Document::open(path, config),
        Input::Bytes(bytes) => Document::from_bytes(bytes, config),
    }
}

fn write(doc: &mut Document, output: Output, cancel: &CancelFlag) -> Result<CommandOutput> {
    match output {
        Output::Memory => Ok(CommandOutput::Bytes(writer::write_full(
            doc, "", cancel,
        )?)),
        Output::Path(path) => {
            writer::save_full(doc, &path, cancel)?;
            Ok(CommandOutput::Saved)
        }
    }
}

fn list_info(doc: &mut Document) -> Result<Vec<String>> {
    let stats = doc.stats();
    let mut lines = vec![
        format!("version: {}", doc.effective_version()),
        format!("file size: {} bytes", stats.file_size),
        format!("pages: {}", doc.page_count()?),
        format!(
            "objects: {} in use, {} free, {} compressed",
            stats.in_use, stats.free, stats.compressed
        ),
        format!("encrypted: {}", doc.is_encrypted()),
        format!("linearized: {}", doc.linearization().is_some()),
    ];

    if let Some(info) = doc.trailer().get(b"Info").cloned() {
        let info = doc.resolve(&info)?;
        if let Some(dict) = info.as_dict() {
            for key in [b"Title".as_ref(), b"Author".as_ref(), b"Producer".as_ref()] {
                if let Some(text) = dict.get(key).and_then(crate::objects::Object::as_text) {
                    lines.push(format!(
                        "{}: {}",
                        String::from_utf8_lossy(key).to_lowercase(),
                        text
                    ));
                }
            }
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::tests::minimal_pdf;

    fn config() -> Configuration {
        let mut config = Configuration::default();
        config.pinned_timestamp = Some(1_700_000_000);
        config
    }

    #[test]
    fn test_page_count_command() {
        let out = process(
            Command::PageCount {
                input: Input::Bytes(minimal_pdf()),
            },
            config(),
        )
        .unwrap();
        assert_eq!(out, CommandOutput::List(vec!["1".to_string()]));
    }

    #[test]
    fn test_list_info_command() {
        let out = process(
            Command::ListInfo {
                input: Input::Bytes(minimal_pdf()),
            },
            config(),
        )
        .unwrap();
        let CommandOutput::List(lines) = out else {
            panic!("expected list");
        };
        assert!(lines.iter().any(|l| l == "version: 1.4"));
        assert!(lines.iter().any(|l| l == "pages: 1"));
        assert!(lines.iter().any(|l| l == "encrypted: false"));
    }

    #[test]
    fn test_validate_command_clean() {
        let out = process(
            Command::Validate {
                input: Input::Bytes(minimal_pdf()),
            },
            config(),
        )
        .unwrap();
        assert_eq!(out, CommandOutput::List(Vec::new()));
    }

    #[test]
    fn test_insert_page_roundtrip() {
        let out = process(
            Command::InsertPage {
                input: Input::Bytes(minimal_pdf()),
                output: Output::Memory,
                before: 1,
            },
            config(),
        )
        .unwrap();
        let CommandOutput::Bytes(bytes) = out else {
            panic!("expected bytes");
        };

        let count = process(
            Command::PageCount {
                input: Input::Bytes(bytes),
            },
            config(),
        )
        .unwrap();
        assert_eq!(count, CommandOutput::List(vec!["2".to_string()]));
    }

    #[test]
    fn test_encrypt_requires_password() {
        let result = process(
            Command::Encrypt {
                input: Input::Bytes(minimal_pdf()),
                output: Output::Memory,
                permissions: Permissions::all_granted(),
            },
            config(),
        );
        assert!(matches!(result, Err(PdfError::PasswordRequired)));
    }

    #[test]
    fn test_encrypt_then_reopen_with_password() {
        let mut encrypt_config = config();
        encrypt_config.user_password = b"user".to_vec();
        encrypt_config.owner_password = b"owner".to_vec();

        let out = process(
            Command::Encrypt {
                input: Input::Bytes(minimal_pdf()),
                output: Output::Memory,
                permissions: Permissions::all_granted(),
            },
            encrypt_config,
        )
        .unwrap();
        let CommandOutput::Bytes(bytes) = out else {
            panic!("expected bytes");
        };

        // Without a password the document refuses to open.
        assert!(matches!(
            process(
                Command::PageCount {
                    input: Input::Bytes(bytes.clone()),
                },
                config(),
            ),
            Err(PdfError::PasswordRequired)
        ));

        let mut open_config = config();
        open_config.user_password = b"user".to_vec();
        let count = process(
            Command::PageCount {
                input: Input::Bytes(bytes),
            },
            open_config,
        )
        .unwrap();
        assert_eq!(count, CommandOutput::List(vec!["1".to_string()]));
    }

    #[test]
    fn test_trim_command_removes_selected() {
        // Build a 3-page document, then remove page 2.
        let grown = process(
            Command::InsertPage {
                input: Input::Bytes(minimal_pdf()),
                output: Output::Memory,
                before: 2,
            },
            config(),
        )
        .unwrap();
        let CommandOutput::Bytes(two_pages) = grown else {
            panic!()
        };
        let grown = process(
            Command::InsertPage {
                input: Input::Bytes(two_pages),
                output: Output::Memory,
                before: 3,
            },
            config(),
        )
        .unwrap();
        let CommandOutput::Bytes(three_pages) = grown else {
            panic!()
        };

        let out = process(
            Command::Trim {
                input: Input::Bytes(three_pages),
                output: Output::Memory,
                selection: "2".to_string(),
            },
            config(),
        )
        .unwrap();
        let CommandOutput::Bytes(bytes) = out else {
            panic!()
        };
        let count = process(
            Command::PageCount {
                input: Input::Bytes(bytes),
            },
            config(),
        )
        .unwrap();
        assert_eq!(count, CommandOutput::List(vec!["2".to_string()]));
    }
}
