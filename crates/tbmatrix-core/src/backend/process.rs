//! Child-process backend for GHDL, NVC and ModelSim/Questa.

use super::{AnalyzeRequest, SimulationOutcome, SimulationRequest, Simulator, SourceCompiler};
use crate::error::{MatrixError, Result};
use crate::flags::BackendId;
use crate::scan::scan_vhdl;
use crate::unit::UnitDecl;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Supported tool families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toolchain {
    Ghdl,
    Nvc,
    ModelSim,
}

impl Toolchain {
    pub fn for_backend(backend: &BackendId) -> Result<Self> {
        match backend.as_str() {
            "ghdl" => Ok(Toolchain::Ghdl),
            "nvc" => Ok(Toolchain::Nvc),
            "modelsim" | "questa" => Ok(Toolchain::ModelSim),
            other => Err(MatrixError::UnknownBackend(other.to_string())),
        }
    }

    /// Commands compiling one group of sources, in execution order.
    pub fn analyze_commands(&self, request: &AnalyzeRequest) -> Vec<Vec<String>> {
        let lib_root = path_str(&request.output_dir);
        let files = request.sources.iter().map(|p| path_str(p));

        match self {
            Toolchain::Ghdl => {
                let mut cmd = vec![
                    "ghdl".to_string(),
                    "-a".to_string(),
                    "--std=08".to_string(),
                    format!("--work={}", request.library),
                    format!("--workdir={lib_root}"),
                    format!("-P{lib_root}"),
                ];
                cmd.extend(request.flags.iter().cloned());
                cmd.extend(files);
                vec![cmd]
            }
            Toolchain::Nvc => {
                let mut cmd = vec![
                    "nvc".to_string(),
                    "--std=2008".to_string(),
                    format!("--work={}:{}/{}", request.library, lib_root, request.library),
                    "-L".to_string(),
                    lib_root.clone(),
                    "-a".to_string(),
                ];
                cmd.extend(request.flags.iter().cloned());
                cmd.extend(files);
                vec![cmd]
            }
            Toolchain::ModelSim => {
                let lib_dir = format!("{}/{}", lib_root, request.library);
                let mut vcom = vec![
                    "vcom".to_string(),
                    "-2008".to_string(),
                    "-work".to_string(),
                    request.library.clone(),
                ];
                vcom.extend(request.flags.iter().cloned());
                vcom.extend(files);
                vec![
                    vec!["vlib".to_string(), lib_dir.clone()],
                    vec!["vmap".to_string(), request.library.clone(), lib_dir],
                    vcom,
                ]
            }
        }
    }

    /// Command that elaborates and runs one testbench.
    ///
    /// With `gui` set, ModelSim opens its GUI and sources the waveform script
    /// as the init file instead of running to completion. GHDL and NVC have no
    /// GUI mode and ignore it.
    pub fn simulate_command(
        &self,
        request: &SimulationRequest,
        lib_root: &Path,
        gui: bool,
    ) -> Vec<String> {
        let lib_root = path_str(lib_root);
        let generics = request
            .parameters
            .iter()
            .map(|(name, value)| (name.clone(), value.to_string()));

        match self {
            Toolchain::Ghdl => {
                let mut cmd = vec![
                    "ghdl".to_string(),
                    "--elab-run".to_string(),
                    "--std=08".to_string(),
                    format!("--work={}", request.library),
                    format!("--workdir={lib_root}"),
                    format!("-P{lib_root}"),
                ];
                cmd.extend(request.flags.iter().cloned());
                cmd.push(request.testbench.clone());
                cmd.extend(generics.map(|(n, v)| format!("-g{n}={v}")));
                cmd
            }
            Toolchain::Nvc => {
                let mut cmd = vec![
                    "nvc".to_string(),
                    "--std=2008".to_string(),
                    format!("--work={}:{}/{}", request.library, lib_root, request.library),
                    "-L".to_string(),
                    lib_root,
                    "-e".to_string(),
                ];
                cmd.extend(request.flags.iter().cloned());
                cmd.extend(generics.map(|(n, v)| format!("-g{n}={v}")));
                cmd.push(request.testbench.clone());
                cmd.push("-r".to_string());
                cmd
            }
            Toolchain::ModelSim => {
                let mut cmd = vec![
                    "vsim".to_string(),
                    (if gui { "-gui" } else { "-c" }).to_string(),
                    "-modelsimini".to_string(),
                    format!("{lib_root}/modelsim.ini"),
                ];
                cmd.extend(request.flags.iter().cloned());
                cmd.extend(generics.map(|(n, v)| format!("-G{n}={v}")));
                cmd.push(format!("{}.{}", request.library, request.testbench));
                if !gui {
                    cmd.push("-do".to_string());
                    cmd.push("run -all; quit -f".to_string());
                } else if let Some(path) = &request.wave_script {
                    cmd.push("-do".to_string());
                    cmd.push(format!("do {{{}}}", path_str(path)));
                }
                cmd
            }
        }
    }

    /// ModelSim exits 0 even when an assertion fires, so its transcript is checked too.
    fn output_reports_failure(&self, output: &str) -> bool {
        match self {
            Toolchain::ModelSim => output
                .lines()
                .any(|l| l.starts_with("# ** Failure") || l.starts_with("# ** Error")),
            _ => false,
        }
    }
}

/// Captured result of one child process.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub success: bool,
}

impl CommandOutput {
    /// stdout followed by stderr.
    pub fn transcript(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&self.stderr);
        }
        text
    }
}

/// Run `command` to completion in `cwd`.
///
/// The child is killed if the returned future is dropped, which is how
/// dispatcher timeouts terminate hung simulators.
pub async fn run_command(command: &[String], cwd: Option<&Path>) -> Result<CommandOutput> {
    let start = Instant::now();

    let Some((exe, args)) = command.split_first() else {
        return Err(MatrixError::Execution("empty command".to_string()));
    };

    let mut cmd = Command::new(exe);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    debug!(command = %command.join(" "), "Spawning");
    let child = cmd
        .spawn()
        .map_err(|e| MatrixError::Execution(format!("failed to spawn '{exe}': {e}")))?;
    let output = child.wait_with_output().await?;

    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration_ms: start.elapsed().as_millis() as u64,
        success: output.status.success(),
    })
}

/// Compiler and simulator backed by real tool processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessBackend {
    gui: bool,
}

impl ProcessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the simulator GUI for each run instead of running in batch mode.
    pub fn with_gui(mut self, gui: bool) -> Self {
        self.gui = gui;
        self
    }
}

#[async_trait]
impl SourceCompiler for ProcessBackend {
    async fn scan(&self, library: &str, sources: &[PathBuf]) -> Result<Vec<(PathBuf, UnitDecl)>> {
        let mut units = Vec::new();
        for source in sources {
            let is_vhdl = source
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("vhd") || ext.eq_ignore_ascii_case("vhdl"))
                .unwrap_or(false);
            if !is_vhdl {
                debug!(library = %library, source = %source.display(), "Skipping non-VHDL source");
                continue;
            }
            let text = tokio::fs::read_to_string(source)
                .await
                .map_err(|e| MatrixError::ReadSource {
                    path: source.clone(),
                    source: e,
                })?;
            units.extend(scan_vhdl(&text).into_iter().map(|decl| (source.clone(), decl)));
        }
        Ok(units)
    }

    async fn analyze(&self, request: &AnalyzeRequest) -> Result<()> {
        let toolchain = Toolchain::for_backend(&request.backend)?;
        tokio::fs::create_dir_all(&request.output_dir).await?;

        // ModelSim runs inside the library root, so every path is made absolute.
        let mut request = request.clone();
        request.output_dir = tokio::fs::canonicalize(&request.output_dir).await?;
        request.sources = request
            .sources
            .iter()
            .map(|s| absolute(s))
            .collect::<Result<_>>()?;

        for command in toolchain.analyze_commands(&request) {
            let cwd = match toolchain {
                Toolchain::ModelSim => Some(request.output_dir.as_path()),
                _ => None,
            };
            let output = run_command(&command, cwd).await?;
            if !output.success {
                return Err(MatrixError::Compilation {
                    library: request.library.clone(),
                    diagnostics: output.transcript(),
                });
            }
        }
        info!(library = %request.library, files = request.sources.len(), "Compiled");
        Ok(())
    }
}

#[async_trait]
impl Simulator for ProcessBackend {
    async fn simulate(&self, mut request: SimulationRequest) -> Result<SimulationOutcome> {
        let toolchain = Toolchain::for_backend(&request.backend)?;
        if let Some(script) = &request.wave_script {
            request.wave_script = Some(absolute(script)?);
        }
        let lib_root = tokio::fs::canonicalize(&request.library_dir)
            .await
            .unwrap_or_else(|_| request.library_dir.clone());

        if self.gui && toolchain != Toolchain::ModelSim {
            warn!(backend = %request.backend, "No GUI mode for this backend; running in batch");
        }

        let command = toolchain.simulate_command(&request, &lib_root, self.gui);
        let output = run_command(&command, Some(request.run_dir())).await?;
        let transcript = output.transcript();
        tokio::fs::write(request.run_dir().join("output.txt"), &transcript).await?;

        if output.success && !toolchain.output_reports_failure(&transcript) {
            Ok(SimulationOutcome::passed(transcript))
        } else {
            Ok(SimulationOutcome::failed(format!(
                "exit code {}\n{}",
                output.exit_code,
                tail(&transcript, 40)
            )))
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Last `n` lines of `text`.
fn tail(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::ParamValue;
    use std::collections::BTreeMap;

    fn sim_request(backend: &str) -> SimulationRequest {
        let mut parameters = BTreeMap::new();
        parameters.insert("AC_D_g".to_string(), ParamValue::Numeric("1.0".to_string()));
        parameters.insert("DC_g".to_string(), ParamValue::Numeric("0.0".to_string()));
        SimulationRequest {
            backend: BackendId::new(backend),
            run_name: "project.abc2dq_tb.d".to_string(),
            library: "project".to_string(),
            testbench: "abc2dq_tb".to_string(),
            parameters,
            flags: vec!["-frelaxed".to_string()],
            wave_script: None,
            library_dir: PathBuf::from("/out/libraries"),
            run_dir: PathBuf::from("/out/runs/project.abc2dq_tb.d"),
        }
    }

    #[test]
    fn test_toolchain_for_backend() {
        assert_eq!(Toolchain::for_backend(&BackendId::new("ghdl")).unwrap(), Toolchain::Ghdl);
        assert_eq!(Toolchain::for_backend(&BackendId::new("questa")).unwrap(), Toolchain::ModelSim);
        assert!(Toolchain::for_backend(&BackendId::new("foo")).is_err());
    }

    #[test]
    fn test_ghdl_simulate_command() {
        let request = sim_request("ghdl");
        let cmd = Toolchain::Ghdl.simulate_command(&request, Path::new("/out/libraries"), false);
        assert_eq!(cmd[0], "ghdl");
        assert_eq!(cmd[1], "--elab-run");
        assert!(cmd.contains(&"--work=project".to_string()));
        let tb_pos = cmd.iter().position(|a| a == "abc2dq_tb").unwrap();
        let flag_pos = cmd.iter().position(|a| a == "-frelaxed").unwrap();
        assert!(flag_pos < tb_pos);
        assert_eq!(cmd[tb_pos + 1], "-gAC_D_g=1.0");
        assert_eq!(cmd[tb_pos + 2], "-gDC_g=0.0");
    }

    #[test]
    fn test_nvc_simulate_command_runs_after_elaboration() {
        let request = sim_request("nvc");
        let cmd = Toolchain::Nvc.simulate_command(&request, Path::new("/out/libraries"), false);
        assert_eq!(cmd.last().unwrap(), "-r");
        assert!(cmd.contains(&"--work=project:/out/libraries/project".to_string()));
        assert!(cmd.contains(&"-gAC_D_g=1.0".to_string()));
    }

    #[test]
    fn test_modelsim_batch_skips_wave_script() {
        let mut request = sim_request("modelsim");
        request.wave_script = Some(PathBuf::from("/sim/scripts/abc2dq_tb_wave.do"));
        let cmd = Toolchain::ModelSim.simulate_command(&request, Path::new("/out/libraries"), false);
        assert_eq!(cmd[1], "-c");
        assert!(cmd.contains(&"project.abc2dq_tb".to_string()));
        assert!(cmd.contains(&"-GAC_D_g=1.0".to_string()));
        assert_eq!(cmd.last().unwrap(), "run -all; quit -f");
        assert!(!cmd.iter().any(|a| a.contains("abc2dq_tb_wave.do")));
    }

    #[test]
    fn test_modelsim_gui_sources_wave_script() {
        let mut request = sim_request("modelsim");
        request.wave_script = Some(PathBuf::from("/sim/scripts/abc2dq_tb_wave.do"));
        let cmd = Toolchain::ModelSim.simulate_command(&request, Path::new("/out/libraries"), true);
        assert_eq!(cmd[1], "-gui");
        assert!(!cmd.contains(&"-c".to_string()));
        assert_eq!(cmd[cmd.len() - 2], "-do");
        assert_eq!(cmd.last().unwrap(), "do {/sim/scripts/abc2dq_tb_wave.do}");

        // Without a script the GUI opens with nothing sourced.
        request.wave_script = None;
        let cmd = Toolchain::ModelSim.simulate_command(&request, Path::new("/out/libraries"), true);
        assert_eq!(cmd.last().unwrap(), "project.abc2dq_tb");
    }

    #[test]
    fn test_gui_ignored_by_ghdl() {
        let request = sim_request("ghdl");
        let lib_root = Path::new("/out/libraries");
        assert_eq!(
            Toolchain::Ghdl.simulate_command(&request, lib_root, true),
            Toolchain::Ghdl.simulate_command(&request, lib_root, false)
        );
    }

    #[test]
    fn test_ghdl_analyze_command() {
        let request = AnalyzeRequest {
            backend: BackendId::new("ghdl"),
            library: "olo".to_string(),
            sources: vec![PathBuf::from("lib/a.vhd"), PathBuf::from("lib/b.vhd")],
            flags: vec!["-frelaxed-rules".to_string(), "-Wno-hide".to_string()],
            output_dir: PathBuf::from("out/libraries"),
        };
        let cmds = Toolchain::Ghdl.analyze_commands(&request);
        assert_eq!(cmds.len(), 1);
        let cmd = &cmds[0];
        assert_eq!(&cmd[..2], &["ghdl".to_string(), "-a".to_string()]);
        assert!(cmd.contains(&"--work=olo".to_string()));
        assert_eq!(cmd[cmd.len() - 2..], ["lib/a.vhd".to_string(), "lib/b.vhd".to_string()]);
    }

    #[test]
    fn test_modelsim_failure_in_transcript() {
        assert!(Toolchain::ModelSim.output_reports_failure("# ** Failure: out of range\n"));
        assert!(!Toolchain::Ghdl.output_reports_failure("# ** Failure: out of range\n"));
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail("a\nb\nc", 2), "b\nc");
        assert_eq!(tail("a", 5), "a");
    }

    #[tokio::test]
    async fn test_run_command_captures_output() {
        let output = run_command(&["echo".to_string(), "hello".to_string()], None)
            .await
            .expect("echo failed");
        assert!(output.success);
        assert_eq!(output.exit_code, 0);
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_run_command_spawn_failure_is_execution_error() {
        let err = run_command(&["definitely-not-a-simulator-xyz".to_string()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, MatrixError::Execution(_)));
    }

    #[tokio::test]
    async fn test_scan_reads_vhdl_only() {
        let dir = tempfile::tempdir().unwrap();
        let vhd = dir.path().join("dq2abc_tb.vhd");
        let v = dir.path().join("top.v");
        std::fs::write(&vhd, "entity dq2abc_tb is generic (D_g : real := 0.0); end;").unwrap();
        std::fs::write(&v, "module top; endmodule").unwrap();

        let units = ProcessBackend::new()
            .scan("project", &[vhd.clone(), v])
            .await
            .unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].0, vhd);
        assert_eq!(units[0].1.entity, "dq2abc_tb");
    }
}
