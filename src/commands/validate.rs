use anyhow::{Result, bail};
use std::path::PathBuf;

use crate::Context;
use crate::spec::{self, VerifySpec};
use crate::ui;

pub fn run(ctx: &Context, specs: &[PathBuf]) -> Result<()> {
    let paths = spec::collect_paths(specs)?;
    if paths.is_empty() {
        bail!("No spec files found");
    }

    let mut invalid = 0;
    for path in &paths {
        match VerifySpec::load(path) {
            Ok(spec) => {
                if !ctx.quiet {
                    ui::success(&format!(
                        "{}: '{}' with {} checks",
                        path.display(),
                        spec.name,
                        spec.check_count()
                    ));
                }
            }
            Err(e) => {
                invalid += 1;
                ui::error(&format!("{:#}", e));
            }
        }
    }

    if invalid > 0 {
        bail!("{} of {} spec files are invalid", invalid, paths.len());
    }
    if !ctx.quiet {
        ui::info(&format!("{} spec files valid", paths.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const QUIET: Context = Context {
        verbose: 0,
        quiet: true,
    };

    #[test]
    fn test_valid_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.toml"), "[[packages]]\nname = \"curl\"\n").unwrap();
        fs::write(dir.path().join("b.toml"), "[[commands]]\ncommand = \"true\"\n").unwrap();

        assert!(run(&QUIET, &[dir.path().to_path_buf()]).is_ok());
    }

    #[test]
    fn test_invalid_file_counted() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("good.toml"), "").unwrap();
        fs::write(dir.path().join("bad.toml"), "[[packages]]\nnmae = \"curl\"\n").unwrap();

        let err = run(&QUIET, &[dir.path().to_path_buf()]).unwrap_err();
        assert_eq!(err.to_string(), "1 of 2 spec files are invalid");
    }

    #[test]
    fn test_empty_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(run(&QUIET, &[dir.path().to_path_buf()]).is_err());
    }
}
