//! Best-effort document compression: external tool, then in-process
//! re-serialization, then the untouched input.

use crate::error::ToolError;
use crate::profile::ToolProfile;
use crate::tool::ToolChain;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Which strategy produced the returned bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPath {
    Primary,
    Fallback,
    Passthrough,
}

impl ExecutionPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionPath::Primary => "primary",
            ExecutionPath::Fallback => "fallback",
            ExecutionPath::Passthrough => "passthrough",
        }
    }
}

impl fmt::Display for ExecutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct Execution {
    pub bytes: Vec<u8>,
    pub path: ExecutionPath,
}

// Input/output files for one tool run, removed when dropped
struct TempPair {
    input: PathBuf,
    output: PathBuf,
}

impl TempPair {
    fn new(dir: &Path) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        Self {
            input: dir.join(format!("docshrink_in_{}.pdf", id)),
            output: dir.join(format!("docshrink_out_{}.pdf", id)),
        }
    }
}

impl Drop for TempPair {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.input);
        let _ = std::fs::remove_file(&self.output);
    }
}

pub struct CompressionExecutor {
    tools: ToolChain,
    temp_dir: PathBuf,
}

impl CompressionExecutor {
    pub fn new(tools: ToolChain, temp_dir: PathBuf) -> Self {
        Self { tools, temp_dir }
    }

    /// Never fails: the worst case hands back `input` unchanged. The result
    /// is never larger than the input.
    pub async fn execute(&self, input: &[u8], profile: &ToolProfile) -> Execution {
        match self.run_tool(input, profile).await {
            Ok(bytes) if bytes.len() <= input.len() => {
                return Execution {
                    bytes,
                    path: ExecutionPath::Primary,
                };
            }
            Ok(bytes) => debug!(
                original = input.len(),
                produced = bytes.len(),
                "tool output larger than input, trying fallback"
            ),
            Err(e) => warn!(error = %e, "compression tool unavailable, trying fallback"),
        }

        let owned = input.to_vec();
        match tokio::task::spawn_blocking(move || restructure(&owned)).await {
            Ok(Ok(bytes)) if bytes.len() <= input.len() => {
                return Execution {
                    bytes,
                    path: ExecutionPath::Fallback,
                };
            }
            Ok(Ok(bytes)) => debug!(
                original = input.len(),
                produced = bytes.len(),
                "fallback output larger than input, passing through"
            ),
            Ok(Err(e)) => debug!(error = %e, "fallback failed, passing through"),
            Err(e) => warn!(error = %e, "fallback task aborted, passing through"),
        }

        Execution {
            bytes: input.to_vec(),
            path: ExecutionPath::Passthrough,
        }
    }

    async fn run_tool(&self, input: &[u8], profile: &ToolProfile) -> Result<Vec<u8>, ToolError> {
        if self.tools.is_empty() {
            return Err(ToolError::NoCandidates);
        }

        let temp = TempPair::new(&self.temp_dir);
        tokio::fs::write(&temp.input, input).await?;

        let args = profile.tool_args(&temp.input, &temp.output);
        let program = self.tools.run_first(&args).await?;

        match tokio::fs::read(&temp.output).await {
            Ok(bytes) if !bytes.is_empty() => Ok(bytes),
            _ => Err(ToolError::EmptyOutput {
                program: program.to_string(),
            }),
        }
    }
}

/// Parse the document, compress its streams and write it back out.
pub fn restructure(input: &[u8]) -> Result<Vec<u8>, String> {
    let mut doc = lopdf::Document::load_mem(input).map_err(|e| format!("parse: {}", e))?;
    doc.compress();

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| format!("save: {}", e))?;
    Ok(output)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::profile::resolve;
    use lopdf::{Document, Object, Stream, dictionary};
    use std::time::Duration;
    use tempfile::TempDir;

    pub(crate) fn sample_pdf(pages: usize) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();
        for i in 0..pages {
            let content = format!("BT /F1 12 Tf 72 720 Td (page {}) Tj ET\n", i).repeat(200);
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::from(page_id));
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    fn executor(tools: &[&str], dir: &TempDir) -> CompressionExecutor {
        let entries: Vec<String> = tools.iter().map(|s| s.to_string()).collect();
        CompressionExecutor::new(
            ToolChain::new(&entries, Duration::from_secs(10)),
            dir.path().to_path_buf(),
        )
    }

    fn assert_no_leftovers(dir: &TempDir) {
        let left: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(left.is_empty(), "temporary files left behind: {:?}", left);
    }

    // Writes a script that emulates the tool by running `body` with $out/$src set
    #[cfg(unix)]
    fn fake_tool(dir: &TempDir, body: &str) -> String {
        let script = dir.path().join("fake-tool.sh");
        let text = format!(
            "for arg in \"$@\"; do\n  case \"$arg\" in\n    -sOutputFile=*) out=\"${{arg#-sOutputFile=}}\" ;;\n  esac\n  src=\"$arg\"\ndone\n{}\n",
            body
        );
        std::fs::write(&script, text).unwrap();
        format!("sh {}", script.display())
    }

    #[tokio::test]
    async fn missing_tool_falls_back_to_valid_document() {
        let dir = TempDir::new().unwrap();
        let input = sample_pdf(3);

        let result = executor(&["docshrink-no-such-tool"], &dir)
            .execute(&input, &resolve(Some("max")))
            .await;

        assert_eq!(result.path, ExecutionPath::Fallback);
        assert!(result.bytes.len() <= input.len());
        let doc = Document::load_mem(&result.bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
        assert_no_leftovers(&dir);
    }

    #[tokio::test]
    async fn corrupt_input_is_returned_unchanged() {
        let dir = TempDir::new().unwrap();
        let input: Vec<u8> = (0..4096u32).map(|i| (i * 31 % 251) as u8).collect();

        let result = executor(&["docshrink-no-such-tool"], &dir)
            .execute(&input, &resolve(None))
            .await;

        assert_eq!(result.path, ExecutionPath::Passthrough);
        assert_eq!(result.bytes, input);
        assert_no_leftovers(&dir);
    }

    #[tokio::test]
    async fn empty_tool_list_skips_straight_to_fallback() {
        let dir = TempDir::new().unwrap();
        let input = sample_pdf(1);

        let result = executor(&[], &dir).execute(&input, &resolve(None)).await;
        assert_eq!(result.path, ExecutionPath::Fallback);
        assert_no_leftovers(&dir);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn working_tool_is_the_primary_path() {
        let tool_dir = TempDir::new().unwrap();
        let work_dir = TempDir::new().unwrap();
        let tool = fake_tool(&tool_dir, "head -c 64 \"$src\" > \"$out\"");
        let input = sample_pdf(2);

        let result = executor(&["docshrink-no-such-tool", tool.as_str()], &work_dir)
            .execute(&input, &resolve(Some("light")))
            .await;

        assert_eq!(result.path, ExecutionPath::Primary);
        assert_eq!(result.bytes, input[..64].to_vec());
        assert_no_leftovers(&work_dir);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn larger_tool_output_is_discarded() {
        let tool_dir = TempDir::new().unwrap();
        let work_dir = TempDir::new().unwrap();
        let tool = fake_tool(&tool_dir, "cat \"$src\" \"$src\" > \"$out\"");
        let input = sample_pdf(2);

        let result = executor(&[tool.as_str()], &work_dir)
            .execute(&input, &resolve(None))
            .await;

        assert_eq!(result.path, ExecutionPath::Fallback);
        assert!(result.bytes.len() <= input.len());
        assert_no_leftovers(&work_dir);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn tool_without_output_counts_as_failure() {
        let tool_dir = TempDir::new().unwrap();
        let work_dir = TempDir::new().unwrap();
        let tool = fake_tool(&tool_dir, "exit 0");
        let input = b"not a document".to_vec();

        let result = executor(&[tool.as_str()], &work_dir)
            .execute(&input, &resolve(None))
            .await;

        assert_eq!(result.path, ExecutionPath::Passthrough);
        assert_eq!(result.bytes, input);
        assert_no_leftovers(&work_dir);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn crashing_tool_still_cleans_up() {
        let tool_dir = TempDir::new().unwrap();
        let work_dir = TempDir::new().unwrap();
        let tool = fake_tool(&tool_dir, "echo partial > \"$out\"; exit 3");
        let input = sample_pdf(1);

        let result = executor(&[tool.as_str()], &work_dir)
            .execute(&input, &resolve(None))
            .await;

        assert_eq!(result.path, ExecutionPath::Fallback);
        assert_no_leftovers(&work_dir);
    }

    #[test]
    fn temp_names_do_not_collide() {
        let dir = std::env::temp_dir();
        let names: std::collections::HashSet<_> =
            (0..1000).map(|_| TempPair::new(&dir).input.clone()).collect();
        assert_eq!(names.len(), 1000);
    }
}
