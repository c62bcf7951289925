//! Package installation and documentation compilation.
//!
//! [`Toolchain`] is the seam between the orchestrator and the outside world
//! (git, python, the site compiler). [`SystemToolchain`] shells out;
//! tests substitute in-memory fakes.

use std::future::Future;
use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use docfleet_shared::{BuildConfig, DocfleetError, Isolation, Result};

use crate::command::{self, CommandSpec};
use crate::source;

// ---------------------------------------------------------------------------
// Tool discovery
// ---------------------------------------------------------------------------

/// Interpreter and compiler executables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub python: PathBuf,
    pub compiler: PathBuf,
}

impl ToolPaths {
    /// Prefer `$CONDA_PREFIX/bin`, else rely on `PATH`.
    pub fn discover(compiler: &str) -> Self {
        let prefix = std::env::var_os("CONDA_PREFIX").map(PathBuf::from);
        Self::from_prefix(prefix.as_deref(), compiler)
    }

    pub fn from_prefix(prefix: Option<&Path>, compiler: &str) -> Self {
        match prefix {
            Some(prefix) => {
                let bin = prefix.join("bin");
                Self {
                    python: bin.join("python"),
                    compiler: bin.join(compiler),
                }
            }
            None => Self {
                python: PathBuf::from("python3"),
                compiler: PathBuf::from(compiler),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// The interpreter a version was installed into, and how to run the compiler
/// against it. Passed explicitly from install to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallScope {
    pub python: PathBuf,
    pub compiler: PathBuf,
    /// Leading compiler arguments (`-m sphinx` inside a venv).
    pub compiler_args: Vec<String>,
}

impl InstallScope {
    fn compiler_command(&self) -> CommandSpec {
        CommandSpec::new(&self.compiler).args(&self.compiler_args)
    }
}

/// Install the package snapshot at `package_dir` for version `version`.
#[derive(Debug, Clone, Copy)]
pub struct InstallRequest<'a> {
    pub version: &'a str,
    pub package_dir: &'a Path,
    pub log_file: &'a Path,
}

/// Compile `source_dir` into `output_dir`.
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    pub scope: &'a InstallScope,
    pub source_dir: &'a Path,
    pub output_dir: &'a Path,
    pub env: &'a [(String, String)],
    pub log_file: &'a Path,
}

/// External operations the orchestrator needs.
pub trait Toolchain: Send + Sync {
    /// Materialize `reference` (or `subpath` of it) under `dest`; returns the file count.
    fn extract(
        &self,
        repo: &Path,
        reference: &str,
        dest: &Path,
        subpath: Option<&str>,
    ) -> impl Future<Output = Result<usize>> + Send;

    /// Install and verify the package.
    fn install(&self, request: InstallRequest<'_>) -> impl Future<Output = Result<InstallScope>> + Send;

    /// Run the compiler; success requires a root `index.html`.
    fn compile(&self, request: CompileRequest<'_>) -> impl Future<Output = Result<()>> + Send;
}

// ---------------------------------------------------------------------------
// System toolchain
// ---------------------------------------------------------------------------

/// git + python + the configured compiler.
#[derive(Debug, Clone)]
pub struct SystemToolchain {
    tools: ToolPaths,
    isolation: Isolation,
    venv_root: PathBuf,
    import_name: String,
    probe_imports: Vec<String>,
    builder: String,
    entry_file: String,
}

impl SystemToolchain {
    pub fn from_config(config: &BuildConfig, tools: ToolPaths) -> Self {
        Self {
            tools,
            isolation: config.docs.isolation,
            venv_root: config.temp_root(),
            import_name: config.source.import_name.clone(),
            probe_imports: config.source.probe_imports.clone(),
            builder: config.docs.builder.clone(),
            entry_file: config.docs.entry_file.clone(),
        }
    }

    async fn scope_for(&self, version: &str, log_file: &Path) -> Result<InstallScope> {
        match self.isolation {
            Isolation::Shared => Ok(InstallScope {
                python: self.tools.python.clone(),
                compiler: self.tools.compiler.clone(),
                compiler_args: Vec::new(),
            }),
            Isolation::Venv => {
                let venv = self.venv_root.join(format!("venv_{version}"));
                info!(venv = %venv.display(), "creating isolated environment");

                let output = command::run(
                    &CommandSpec::new(&self.tools.python)
                        .args(["-m", "venv", "--system-site-packages"])
                        .arg(&venv)
                        .log_to(log_file),
                )
                .await?;
                if !output.success() {
                    return Err(DocfleetError::build(format!(
                        "could not create virtual environment: {}",
                        output.last_error_line()
                    )));
                }

                let python = venv.join("bin").join("python");
                Ok(InstallScope {
                    compiler: python.clone(),
                    python,
                    compiler_args: vec!["-m".into(), "sphinx".into()],
                })
            }
        }
    }

    async fn can_import(&self, python: &Path, module: &str) -> Result<bool> {
        let output = command::run(
            &CommandSpec::new(python)
                .arg("-c")
                .arg(format!("import {module}")),
        )
        .await?;
        Ok(output.success())
    }
}

impl Toolchain for SystemToolchain {
    async fn extract(
        &self,
        repo: &Path,
        reference: &str,
        dest: &Path,
        subpath: Option<&str>,
    ) -> Result<usize> {
        source::git_extract(repo, reference, dest, subpath).await
    }

    #[instrument(skip_all, fields(version = %request.version))]
    async fn install(&self, request: InstallRequest<'_>) -> Result<InstallScope> {
        if !request.package_dir.is_dir() {
            return Err(DocfleetError::build(format!(
                "package path not found: {}",
                request.package_dir.display()
            )));
        }

        let scope = self.scope_for(request.version, request.log_file).await?;
        info!(package = %request.package_dir.display(), python = %scope.python.display(), "installing package");

        let pip = CommandSpec::new(&scope.python)
            .args(["-m", "pip", "install", "."])
            .cwd(request.package_dir);
        // The venv step has already started this version's log.
        let pip = match self.isolation {
            Isolation::Shared => pip.log_to(request.log_file),
            Isolation::Venv => pip.append_to(request.log_file),
        };
        let output = command::run(&pip).await?;
        if !output.success() {
            return Err(DocfleetError::build(format!(
                "installation failed: {}",
                output.last_error_line()
            )));
        }

        if !self.can_import(&scope.python, &self.import_name).await? {
            return Err(DocfleetError::build(format!(
                "failed to import {} after installation",
                self.import_name
            )));
        }

        for module in &self.probe_imports {
            if self.can_import(&scope.python, module).await? {
                info!(module = %module, "optional module available");
            } else {
                warn!(module = %module, "optional module not available");
            }
        }

        Ok(scope)
    }

    #[instrument(skip_all, fields(output = %request.output_dir.display()))]
    async fn compile(&self, request: CompileRequest<'_>) -> Result<()> {
        let entry = request.source_dir.join(&self.entry_file);
        if !entry.is_file() {
            return Err(DocfleetError::build(format!(
                "no {} found in {}",
                self.entry_file,
                request.source_dir.display()
            )));
        }

        tokio::fs::create_dir_all(request.output_dir)
            .await
            .map_err(|e| DocfleetError::io(request.output_dir, e))?;

        info!(source = %request.source_dir.display(), "compiling documentation");
        let output = command::run(
            &request
                .scope
                .compiler_command()
                .args(["-b", self.builder.as_str()])
                .arg(request.source_dir)
                .arg(request.output_dir)
                .envs(request.env.iter().cloned())
                .log_to(request.log_file),
        )
        .await?;

        if !output.success() {
            return Err(DocfleetError::build(match output.code {
                Some(code) => format!("compiler failed with exit status {code}"),
                None => "compiler terminated by signal".to_string(),
            }));
        }

        if !request.output_dir.join("index.html").is_file() {
            return Err(DocfleetError::build(
                "build completed but no index.html was produced",
            ));
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn scratch(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("docfleet-{label}-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn toolchain(python: PathBuf, compiler: PathBuf, root: &Path) -> SystemToolchain {
        let mut config = BuildConfig::example();
        config.base_dir = root.to_path_buf();
        config.source.import_name = "pkg".into();
        config.source.probe_imports = vec!["pkgwrap".into()];
        SystemToolchain::from_config(&config, ToolPaths { python, compiler })
    }

    #[test]
    fn tool_paths_prefer_prefix() {
        let tools = ToolPaths::from_prefix(Some(Path::new("/opt/conda")), "sphinx-build");
        assert_eq!(tools.python, PathBuf::from("/opt/conda/bin/python"));
        assert_eq!(tools.compiler, PathBuf::from("/opt/conda/bin/sphinx-build"));

        let tools = ToolPaths::from_prefix(None, "sphinx-build");
        assert_eq!(tools.python, PathBuf::from("python3"));
        assert_eq!(tools.compiler, PathBuf::from("sphinx-build"));
    }

    #[tokio::test]
    async fn install_runs_pip_and_verifies_import() {
        let dir = scratch("tc-install");
        let calls = dir.join("calls.txt");
        let python = script(&dir, "python", &format!("echo \"$@\" >> {}", calls.display()));
        let pkg = dir.join("pkg");
        std::fs::create_dir_all(&pkg).unwrap();

        let tc = toolchain(python.clone(), dir.join("compiler"), &dir);
        let log = dir.join("logs/install_v1.log");
        let scope = tc
            .install(InstallRequest { version: "v1", package_dir: &pkg, log_file: &log })
            .await
            .unwrap();

        assert_eq!(scope.python, python);
        let recorded = std::fs::read_to_string(&calls).unwrap();
        let lines: Vec<&str> = recorded.lines().collect();
        assert_eq!(lines, vec!["-m pip install .", "-c import pkg", "-c import pkgwrap"]);
        assert!(log.is_file());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn venv_install_keeps_whole_log() {
        let dir = scratch("tc-venv");
        let python = script(
            &dir,
            "python",
            "if [ \"$2\" = \"venv\" ]; then mkdir -p \"$4/bin\" && cp \"$0\" \"$4/bin/python\" && echo created venv; else echo ran \"$*\"; fi",
        );
        let pkg = dir.join("pkg");
        std::fs::create_dir_all(&pkg).unwrap();

        let mut tc = toolchain(python, dir.join("compiler"), &dir);
        tc.isolation = Isolation::Venv;
        let log = dir.join("logs/install_v1.log");
        let scope = tc
            .install(InstallRequest { version: "v1", package_dir: &pkg, log_file: &log })
            .await
            .unwrap();

        assert!(scope.python.ends_with("venv_v1/bin/python"));
        assert_eq!(scope.compiler_args, vec!["-m".to_string(), "sphinx".to_string()]);
        let logged = std::fs::read_to_string(&log).unwrap();
        assert_eq!(logged.lines().collect::<Vec<_>>(), vec!["created venv", "ran -m pip install ."]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn failed_import_is_build_error() {
        let dir = scratch("tc-import");
        let python = script(&dir, "python", "[ \"$1\" = \"-c\" ] && exit 1\nexit 0");
        let pkg = dir.join("pkg");
        std::fs::create_dir_all(&pkg).unwrap();

        let tc = toolchain(python, dir.join("compiler"), &dir);
        let err = tc
            .install(InstallRequest { version: "v1", package_dir: &pkg, log_file: &dir.join("i.log") })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "build error: failed to import pkg after installation");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn compile_passes_env_and_requires_index() {
        let dir = scratch("tc-compile");
        let compiler = script(
            &dir,
            "sphinx-build",
            "mkdir -p \"$4\"\necho \"$1 $2 $DOCS_VERSION\" > \"$4/index.html\"",
        );
        let docs = dir.join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("conf.py"), "").unwrap();

        let tc = toolchain(dir.join("python"), compiler.clone(), &dir);
        let scope = InstallScope { python: dir.join("python"), compiler, compiler_args: Vec::new() };
        let out = dir.join("html/v1");
        let env = vec![("DOCS_VERSION".to_string(), "v1".to_string())];

        tc.compile(CompileRequest {
            scope: &scope,
            source_dir: &docs,
            output_dir: &out,
            env: &env,
            log_file: &dir.join("build.log"),
        })
        .await
        .unwrap();
        assert_eq!(std::fs::read_to_string(out.join("index.html")).unwrap().trim(), "-b html v1");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn compile_without_index_fails() {
        let dir = scratch("tc-noindex");
        let compiler = script(&dir, "sphinx-build", "exit 0");
        let docs = dir.join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("conf.py"), "").unwrap();

        let tc = toolchain(dir.join("python"), compiler.clone(), &dir);
        let scope = InstallScope { python: dir.join("python"), compiler, compiler_args: Vec::new() };
        let err = tc
            .compile(CompileRequest {
                scope: &scope,
                source_dir: &docs,
                output_dir: &dir.join("out"),
                env: &[],
                log_file: &dir.join("build.log"),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DocfleetError::Build { .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn compile_requires_entry_file() {
        let dir = scratch("tc-noconf");
        let tc = toolchain(dir.join("python"), dir.join("compiler"), &dir);
        let scope = InstallScope {
            python: dir.join("python"),
            compiler: dir.join("compiler"),
            compiler_args: Vec::new(),
        };
        let err = tc
            .compile(CompileRequest {
                scope: &scope,
                source_dir: &dir,
                output_dir: &dir.join("out"),
                env: &[],
                log_file: &dir.join("build.log"),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no conf.py"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
