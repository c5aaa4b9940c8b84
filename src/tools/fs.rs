//! File tools - list, read, write, edit

use std::path::Path;
use tracing::debug;

use super::context::SandboxContext;
use super::params::{EditParams, ListParams, ReadParams, WriteParams};
use super::ToolError;

/// List files and directories in a path (non-recursive)
pub async fn list(ctx: &SandboxContext, params: ListParams) -> Result<String, ToolError> {
    debug!(path = %params.path, "fs::list: called");
    let full_path = ctx.validate_path(Path::new(&params.path))?;

    let mut entries = Vec::new();
    let mut dir = tokio::fs::read_dir(&full_path).await?;

    while let Ok(Some(entry)) = dir.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        let metadata = match entry.metadata().await {
            Ok(m) => m,
            Err(_) => {
                debug!(%name, "fs::list: failed to get metadata, skipping entry");
                continue;
            }
        };

        let suffix = if metadata.is_dir() { "/" } else { "" };
        entries.push(format!("{}{}", name, suffix));
    }

    entries.sort();
    debug!(entries_count = %entries.len(), "fs::list: entries collected");

    if entries.is_empty() {
        Ok("(empty directory)".to_string())
    } else {
        Ok(entries.join("\n"))
    }
}

/// Read a file's contents
///
/// Directories and files above the configured byte ceiling are rejected
/// from metadata alone, before the content is touched.
pub async fn read(ctx: &SandboxContext, params: ReadParams) -> Result<String, ToolError> {
    debug!(path = %params.path, "fs::read: called");
    let full_path = ctx.validate_path(Path::new(&params.path))?;

    let metadata = tokio::fs::metadata(&full_path).await?;

    if metadata.is_dir() {
        debug!("fs::read: path is a directory");
        return Err(ToolError::NotAFile { path: full_path });
    }

    if metadata.len() > ctx.max_file_bytes {
        debug!(size = %metadata.len(), limit = %ctx.max_file_bytes, "fs::read: file exceeds ceiling");
        return Err(ToolError::FileTooLarge {
            path: full_path,
            size: metadata.len(),
            limit: ctx.max_file_bytes,
        });
    }

    let content = tokio::fs::read_to_string(&full_path).await?;
    debug!(content_len = %content.len(), "fs::read: file content read");
    Ok(content)
}

/// Create or overwrite a file, creating parent directories as needed
pub async fn write(ctx: &SandboxContext, params: WriteParams) -> Result<String, ToolError> {
    debug!(path = %params.path, content_len = %params.content.len(), "fs::write: called");
    let full_path = ctx.validate_path(Path::new(&params.path))?;

    if let Some(parent) = full_path.parent()
        && !parent.exists()
    {
        debug!(?parent, "fs::write: creating parent directories");
        tokio::fs::create_dir_all(parent).await?;
    }

    tokio::fs::write(&full_path, &params.content).await?;
    debug!("fs::write: file written");

    Ok(format!("Wrote {} bytes to {}", params.content.len(), params.path))
}

/// Replace an exact substring in a file
///
/// Zero occurrences fail as not-found. More than one without replace_all
/// fails as ambiguous, carrying the count. Otherwise the substitution is
/// applied and the replacement count reported.
pub async fn edit(ctx: &SandboxContext, params: EditParams) -> Result<String, ToolError> {
    debug!(path = %params.path, replace_all = %params.replace_all, "fs::edit: called");

    if params.old_text.is_empty() {
        return Err(ToolError::Validation {
            tool: "edit".to_string(),
            message: "old_text must not be empty".to_string(),
        });
    }

    let full_path = ctx.validate_path(Path::new(&params.path))?;
    let content = tokio::fs::read_to_string(&full_path).await?;

    let count = content.matches(&params.old_text).count();
    debug!(%count, "fs::edit: occurrence count");

    if count == 0 {
        return Err(ToolError::EditNotFound);
    }

    if count > 1 && !params.replace_all {
        return Err(ToolError::EditAmbiguous { count });
    }

    let (new_content, replacements) = if params.replace_all {
        (content.replace(&params.old_text, &params.new_text), count)
    } else {
        (content.replacen(&params.old_text, &params.new_text, 1), 1)
    };

    tokio::fs::write(&full_path, &new_content).await?;
    debug!(%replacements, "fs::edit: file written");

    Ok(format!("Replaced {} occurrence(s) in {}", replacements, params.path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn test_ctx(temp: &tempfile::TempDir) -> SandboxContext {
        SandboxContext::rooted(temp.path().to_path_buf())
    }

    #[tokio::test]
    async fn test_list_directory_basic() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("file1.txt"), "").unwrap();
        fs::write(temp.path().join("file2.txt"), "").unwrap();
        fs::create_dir(temp.path().join("subdir")).unwrap();
        let ctx = test_ctx(&temp);

        let output = list(&ctx, ListParams { path: ".".to_string() }).await.unwrap();

        assert!(output.contains("file1.txt"));
        assert!(output.contains("file2.txt"));
        assert!(output.contains("subdir/"));
    }

    #[tokio::test]
    async fn test_list_empty_directory() {
        let temp = tempdir().unwrap();
        let ctx = test_ctx(&temp);

        let output = list(&ctx, ListParams { path: ".".to_string() }).await.unwrap();

        assert_eq!(output, "(empty directory)");
    }

    #[tokio::test]
    async fn test_read_file_contents() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("test.txt"), "line 1\nline 2").unwrap();
        let ctx = test_ctx(&temp);

        let output = read(&ctx, ReadParams { path: "test.txt".to_string() }).await.unwrap();

        assert_eq!(output, "line 1\nline 2");
    }

    #[tokio::test]
    async fn test_read_rejects_directory() {
        let temp = tempdir().unwrap();
        fs::create_dir(temp.path().join("subdir")).unwrap();
        let ctx = test_ctx(&temp);

        let err = read(&ctx, ReadParams { path: "subdir".to_string() }).await.unwrap_err();

        assert!(matches!(err, ToolError::NotAFile { .. }));
    }

    #[tokio::test]
    async fn test_read_rejects_oversize_file() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("big.txt"), "x".repeat(4096)).unwrap();
        let mut ctx = test_ctx(&temp);
        ctx.max_file_bytes = 1024;

        let err = read(&ctx, ReadParams { path: "big.txt".to_string() }).await.unwrap_err();

        match err {
            ToolError::FileTooLarge { size, limit, .. } => {
                assert_eq!(size, 4096);
                assert_eq!(limit, 1024);
            }
            other => panic!("wrong error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_rejects_escape_before_io() {
        let temp = tempdir().unwrap();
        let ctx = test_ctx(&temp);

        let err = read(&ctx, ReadParams { path: "../outside.txt".to_string() }).await.unwrap_err();

        assert!(matches!(err, ToolError::PathEscape { .. }));
    }

    #[tokio::test]
    async fn test_write_creates_parent_directories() {
        let temp = tempdir().unwrap();
        let ctx = test_ctx(&temp);

        let output = write(
            &ctx,
            WriteParams {
                path: "nested/dir/test.txt".to_string(),
                content: "content".to_string(),
            },
        )
        .await
        .unwrap();

        assert!(output.contains("7 bytes"));
        let written = fs::read_to_string(temp.path().join("nested/dir/test.txt")).unwrap();
        assert_eq!(written, "content");
    }

    #[tokio::test]
    async fn test_write_overwrites_existing() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("test.txt"), "old content").unwrap();
        let ctx = test_ctx(&temp);

        write(
            &ctx,
            WriteParams {
                path: "test.txt".to_string(),
                content: "new content".to_string(),
            },
        )
        .await
        .unwrap();

        let written = fs::read_to_string(temp.path().join("test.txt")).unwrap();
        assert_eq!(written, "new content");
    }

    #[tokio::test]
    async fn test_edit_single_occurrence() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("test.txt"), "hello world").unwrap();
        let ctx = test_ctx(&temp);

        let output = edit(
            &ctx,
            EditParams {
                path: "test.txt".to_string(),
                old_text: "world".to_string(),
                new_text: "rust".to_string(),
                replace_all: false,
            },
        )
        .await
        .unwrap();

        assert!(output.contains("1 occurrence"));
        let content = fs::read_to_string(temp.path().join("test.txt")).unwrap();
        assert_eq!(content, "hello rust");
    }

    #[tokio::test]
    async fn test_edit_not_found() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("test.txt"), "hello world").unwrap();
        let ctx = test_ctx(&temp);

        let err = edit(
            &ctx,
            EditParams {
                path: "test.txt".to_string(),
                old_text: "missing".to_string(),
                new_text: "x".to_string(),
                replace_all: false,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ToolError::EditNotFound));
    }

    #[tokio::test]
    async fn test_edit_ambiguous_carries_count() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("test.txt"), "aaa bbb aaa bbb aaa").unwrap();
        let ctx = test_ctx(&temp);

        let err = edit(
            &ctx,
            EditParams {
                path: "test.txt".to_string(),
                old_text: "aaa".to_string(),
                new_text: "ccc".to_string(),
                replace_all: false,
            },
        )
        .await
        .unwrap_err();

        match err {
            ToolError::EditAmbiguous { count } => assert_eq!(count, 3),
            other => panic!("wrong error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_edit_replace_all() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("test.txt"), "aaa bbb aaa").unwrap();
        let ctx = test_ctx(&temp);

        let output = edit(
            &ctx,
            EditParams {
                path: "test.txt".to_string(),
                old_text: "aaa".to_string(),
                new_text: "ccc".to_string(),
                replace_all: true,
            },
        )
        .await
        .unwrap();

        assert!(output.contains("2 occurrence"));
        let content = fs::read_to_string(temp.path().join("test.txt")).unwrap();
        assert_eq!(content, "ccc bbb ccc");
    }
}
