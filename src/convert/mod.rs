//! Document conversion and page extraction through external tools

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::config::CommandSpec;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("input {} does not exist", .0.display())]
    MissingInput(PathBuf),

    #[error("failed to start '{program}'")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("'{program}' exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("'{program}' finished but {} was not produced", output.display())]
    MissingOutput { program: String, output: PathBuf },

    #[error("failed to prepare {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Turns a source document into a PDF.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn convert(&self, input: &Path, output: &Path) -> Result<(), ConvertError>;
}

/// Writes the last page of a PDF to a new single-page PDF.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    async fn extract_last_page(&self, input: &Path, output: &Path) -> Result<(), ConvertError>;
}

/// Converter backed by an external command (LibreOffice by default).
pub struct CommandConverter {
    command: CommandSpec,
}

impl CommandConverter {
    pub fn new(command: CommandSpec) -> Self {
        Self { command }
    }
}

#[async_trait]
impl DocumentConverter for CommandConverter {
    async fn convert(&self, input: &Path, output: &Path) -> Result<(), ConvertError> {
        run(&self.command, input, output).await?;
        if output.exists() {
            return Ok(());
        }

        // Converters that take an output directory name the file after the input
        let produced = input
            .file_stem()
            .map(|stem| outdir(output).join(format!("{}.pdf", stem.to_string_lossy())));
        match produced {
            Some(produced) if produced.exists() => {
                tracing::debug!("Moving {} to {}", produced.display(), output.display());
                tokio::fs::rename(&produced, output)
                    .await
                    .map_err(|source| ConvertError::Io {
                        path: output.to_path_buf(),
                        source,
                    })
            }
            _ => Err(ConvertError::MissingOutput {
                program: self.command.program.clone(),
                output: output.to_path_buf(),
            }),
        }
    }
}

/// Page extractor backed by an external command (qpdf by default).
pub struct CommandExtractor {
    command: CommandSpec,
}

impl CommandExtractor {
    pub fn new(command: CommandSpec) -> Self {
        Self { command }
    }
}

#[async_trait]
impl PageExtractor for CommandExtractor {
    async fn extract_last_page(&self, input: &Path, output: &Path) -> Result<(), ConvertError> {
        run(&self.command, input, output).await?;
        if !output.exists() {
            return Err(ConvertError::MissingOutput {
                program: self.command.program.clone(),
                output: output.to_path_buf(),
            });
        }
        Ok(())
    }
}

fn outdir(output: &Path) -> PathBuf {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Substitute `{input}`, `{output}` and `{outdir}` in each argument.
fn expand_args(spec: &CommandSpec, input: &Path, output: &Path) -> Vec<OsString> {
    let input = input.to_string_lossy();
    let out = output.to_string_lossy();
    let dir = outdir(output);
    let dir = dir.to_string_lossy();

    spec.args
        .iter()
        .map(|arg| {
            OsString::from(
                arg.replace("{input}", &input)
                    .replace("{output}", &out)
                    .replace("{outdir}", &dir),
            )
        })
        .collect()
}

async fn run(spec: &CommandSpec, input: &Path, output: &Path) -> Result<(), ConvertError> {
    if !input.exists() {
        return Err(ConvertError::MissingInput(input.to_path_buf()));
    }

    let dir = outdir(output);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|source| ConvertError::Io { path: dir, source })?;

    let args = expand_args(spec, input, output);
    tracing::debug!("Running {} {:?}", spec.program, args);

    // Tool chatter is discarded; stderr is kept for the error message
    let result = Command::new(&spec.program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| ConvertError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

    if !result.status.success() {
        return Err(ConvertError::Failed {
            program: spec.program.clone(),
            status: result.status.to_string(),
            stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// Remove a generated local file. Returns false when it was already gone.
pub fn cleanup(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn shell(script: &str, args: &[&str]) -> CommandSpec {
        let mut all = vec!["-c".to_string(), script.to_string()];
        all.extend(args.iter().map(|a| a.to_string()));
        CommandSpec {
            program: "sh".to_string(),
            args: all,
        }
    }

    #[test]
    fn test_expand_placeholders() {
        let spec = CommandSpec {
            program: "soffice".to_string(),
            args: vec![
                "--outdir".to_string(),
                "{outdir}".to_string(),
                "{input}".to_string(),
                "--to={output}".to_string(),
            ],
        };
        let args = expand_args(
            &spec,
            Path::new("/docs/Program.docx"),
            Path::new("/out/Program.pdf"),
        );
        assert_eq!(
            args,
            vec![
                OsString::from("--outdir"),
                OsString::from("/out"),
                OsString::from("/docs/Program.docx"),
                OsString::from("--to=/out/Program.pdf"),
            ]
        );
    }

    #[test]
    fn test_outdir_of_bare_file_name() {
        assert_eq!(outdir(Path::new("Program.pdf")), PathBuf::from("."));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_convert_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("Program.docx");
        let output = dir.path().join("out").join("Program.pdf");
        fs::write(&input, b"doc").unwrap();

        let converter = CommandConverter::new(shell(r#"cp "$0" "$1""#, &["{input}", "{output}"]));
        converter.convert(&input, &output).await.unwrap();

        assert_eq!(fs::read(&output).unwrap(), b"doc");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_convert_moves_tool_named_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("Program.docx");
        let output = dir.path().join("Backup.pdf");
        fs::write(&input, b"doc").unwrap();

        // Mimics `soffice --outdir`, which names the PDF after the input
        let converter = CommandConverter::new(shell(
            r#"cp "$0" "$1/Program.pdf""#,
            &["{input}", "{outdir}"],
        ));
        converter.convert(&input, &output).await.unwrap();

        assert!(output.exists());
        assert!(!dir.path().join("Program.pdf").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_convert_without_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("Program.docx");
        fs::write(&input, b"doc").unwrap();

        let converter = CommandConverter::new(shell("true", &[]));
        let err = converter
            .convert(&input, &dir.path().join("Program.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::MissingOutput { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_tool_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.pdf");
        fs::write(&input, b"pdf").unwrap();

        let extractor = CommandExtractor::new(shell("echo boom >&2; exit 3", &[]));
        let err = extractor
            .extract_last_page(&input, &dir.path().join("last.pdf"))
            .await
            .unwrap_err();
        match err {
            ConvertError::Failed { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_input_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let converter = CommandConverter::new(CommandSpec {
            program: "does-not-matter".to_string(),
            args: Vec::new(),
        });
        let err = converter
            .convert(&dir.path().join("absent.docx"), &dir.path().join("out.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::MissingInput(_)));
    }

    #[tokio::test]
    async fn test_unknown_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.docx");
        fs::write(&input, b"doc").unwrap();

        let converter = CommandConverter::new(CommandSpec {
            program: "drive-backup-no-such-tool".to_string(),
            args: Vec::new(),
        });
        let err = converter
            .convert(&input, &dir.path().join("out.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Spawn { .. }));
    }

    #[test]
    fn test_cleanup_reports_presence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Program.pdf");
        fs::write(&path, b"pdf").unwrap();

        assert!(cleanup(&path).unwrap());
        assert!(!path.exists());
        assert!(!cleanup(&path).unwrap());
    }
}
