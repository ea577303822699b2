//! Build and launch sequencing.
//!
//! `build` turns the front-end output into a server: it makes sure the output
//! exists, compiles proxy routes, and hands everything to the server-build
//! collaborator. `start` and `start_cmd` launch a tagged process through the
//! supervisor so that `stop` and `find` can address it later.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{Config, FrontendKind};
use crate::error::{Error, Result};
use crate::logger::{green, red, Logger};
use crate::process::LaunchSpec;
use crate::prompt::Prompt;
use crate::routes::{self, CompileMode, RouteTable};
use crate::scanner::ProcessLister;
use crate::supervisor::{run_attached, ProcessSupervisor, Terminator};

pub const DEFAULT_OUT_DIR: &str = "dist";
pub const DEFAULT_PRESET: &str = "node-cluster";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_SERVER_BUILD: &str = "npx nitropack build";

/// Server runtime metadata written next to the built server.
pub const META_FILE: &str = "nitro.json";
/// Directory the server engine builds into.
pub const SERVER_OUTPUT_DIR: &str = ".output";
/// Where the generated server options are written.
pub const OPTIONS_FILE: &str = ".nitro-proxy/server-options.json";
/// Environment variable pointing the server build at the options file.
pub const OPTIONS_ENV: &str = "NITRO_PROXY_OPTIONS";

const PUBLIC_ASSET_MAX_AGE: u32 = 3600;

/// Flags of the `build` command.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub root: PathBuf,
    pub minify: Option<bool>,
    pub preset: Option<String>,
    pub port: Option<u16>,
    pub frontend: Option<FrontendKind>,
    pub force: bool,
}

/// Options handed to the server engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerOptions {
    pub root_dir: PathBuf,
    pub dev: bool,
    pub minify: bool,
    pub preset: String,
    pub public_assets: Vec<PublicAsset>,
    pub route_rules: RouteTable,
    pub experimental: Experimental,
    pub source_map: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicAsset {
    pub dir: PathBuf,
    pub max_age: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Experimental {
    pub async_context: bool,
}

/// What a finished build produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub output: PathBuf,
    pub routes: usize,
    pub rebuilt_frontend: bool,
}

/// Produces the front-end assets.
#[allow(async_fn_in_trait)]
pub trait FrontendBuilder {
    async fn build(&self, root: &Path, kind: FrontendKind) -> Result<()>;
}

/// Builds the server from compiled options; returns the output directory.
#[allow(async_fn_in_trait)]
pub trait ServerBuilder {
    async fn build(&self, options: &ServerOptions, port: u16) -> Result<PathBuf>;
}

/// Runs the project's build script, or the build tool directly.
#[derive(Debug, Clone)]
pub struct ScriptFrontendBuilder {
    logger: Logger,
}

impl ScriptFrontendBuilder {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

impl FrontendBuilder for ScriptFrontendBuilder {
    async fn build(&self, root: &Path, kind: FrontendKind) -> Result<()> {
        let spec = detect_build_script(&root.join("package.json"), kind).cwd(root);
        self.logger
            .info(format!("building front-end \u{2192} {}", green(spec.display())));
        let code = run_attached(&spec).await?;
        if code != 0 {
            return Err(Error::CommandFailed {
                command: spec.display(),
                code,
            });
        }
        Ok(())
    }
}

/// Picks `npm run <script>` when `package.json` declares a script invoking the
/// build tool, otherwise the build tool itself through `npx`.
pub fn detect_build_script(package_json: &Path, kind: FrontendKind) -> LaunchSpec {
    let expected = kind.build_command();
    let script = std::fs::read_to_string(package_json)
        .ok()
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
        .and_then(|json| {
            json.get("scripts")?
                .as_object()?
                .iter()
                .find(|(_, cmd)| cmd.as_str().is_some_and(|cmd| cmd.contains(&expected)))
                .map(|(name, _)| name.clone())
        });
    match script {
        Some(name) => LaunchSpec::new(node_tool("npm"), vec!["run".into(), name]),
        None => LaunchSpec::new(
            node_tool("npx"),
            vec![kind.binary().to_string(), "build".into()],
        ),
    }
}

// npm and npx are `.cmd` shims on Windows.
fn node_tool(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.cmd", name)
    } else {
        name.to_string()
    }
}

/// Writes the options file and runs the configured server build command.
#[derive(Debug, Clone)]
pub struct CommandServerBuilder {
    command: String,
    logger: Logger,
}

impl CommandServerBuilder {
    pub fn new(command: Option<String>, logger: Logger) -> Self {
        Self {
            command: command.unwrap_or_else(|| DEFAULT_SERVER_BUILD.to_string()),
            logger,
        }
    }
}

impl ServerBuilder for CommandServerBuilder {
    async fn build(&self, options: &ServerOptions, port: u16) -> Result<PathBuf> {
        let options_path = options.root_dir.join(OPTIONS_FILE);
        if let Some(parent) = options_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(options)
            .map_err(|err| Error::config(format!("failed to encode server options: {}", err)))?;
        tokio::fs::write(&options_path, json).await?;
        self.logger
            .debug(format!("server options \u{2192} {}", options_path.display()));

        let spec = LaunchSpec::parse(&self.command)
            .ok_or_else(|| Error::config(format!("invalid server build command `{}`", self.command)))?
            .cwd(&options.root_dir)
            .env("PORT", port.to_string())
            .env(OPTIONS_ENV, options_path.to_string_lossy());
        self.logger
            .info(format!("building server \u{2192} {}", green(spec.display())));
        let code = run_attached(&spec).await?;
        if code != 0 {
            return Err(Error::CommandFailed {
                command: spec.display(),
                code,
            });
        }
        Ok(options.root_dir.join(SERVER_OUTPUT_DIR))
    }
}

pub struct LaunchOrchestrator<P, F, S> {
    prompt: P,
    frontend: F,
    server: S,
    logger: Logger,
}

impl<P: Prompt, F: FrontendBuilder, S: ServerBuilder> LaunchOrchestrator<P, F, S> {
    pub fn new(prompt: P, frontend: F, server: S, logger: Logger) -> Self {
        Self {
            prompt,
            frontend,
            server,
            logger,
        }
    }

    /// Runs the build for `options.root` with the already loaded project
    /// `config`; command-line options take precedence over it.
    pub async fn build(&self, config: Config, options: BuildOptions) -> Result<BuildReport> {
        let root = options.root.clone();
        self.logger.info(format!("root \u{2192} {}", green(root.display().to_string())));

        let out_dir = root.join(config.out_dir.as_deref().unwrap_or(DEFAULT_OUT_DIR));
        let kind = options.frontend.or(config.frontend).unwrap_or_default();
        let rebuilt_frontend = self.ensure_frontend(&root, &out_dir, kind, options.force).await?;

        let mode = if config.strict_routes.unwrap_or(false) {
            CompileMode::Strict
        } else {
            CompileMode::LastWins
        };
        let route_rules = routes::compile(
            config.proxy.iter().map(|(prefix, target)| (prefix.as_str(), target)),
            mode,
        )?;
        if route_rules.is_empty() {
            self.logger.info("no proxy routes configured");
        }
        for (pattern, rule) in route_rules.iter() {
            self.logger
                .info(format!("proxy {} \u{2192} {}", pattern, green(&rule.proxy)));
        }
        let routes = route_rules.len();

        let server_options = ServerOptions {
            root_dir: root.clone(),
            dev: false,
            minify: options.minify.or(config.minify).unwrap_or(true),
            preset: options
                .preset
                .or(config.preset)
                .unwrap_or_else(|| DEFAULT_PRESET.to_string()),
            public_assets: vec![PublicAsset {
                dir: out_dir,
                max_age: PUBLIC_ASSET_MAX_AGE,
            }],
            route_rules,
            experimental: Experimental {
                async_context: true,
            },
            source_map: false,
        };
        let port = options.port.or(config.port).unwrap_or(DEFAULT_PORT);
        let output = self.server.build(&server_options, port).await?;

        self.logger
            .success(format!("server built \u{2192} {}", green(output.display().to_string())));
        self.logger
            .info(format!("start it with \u{2192} {}", green("nitro-proxy start")));
        Ok(BuildReport {
            output,
            routes,
            rebuilt_frontend,
        })
    }

    // Returns whether the front-end was rebuilt.
    async fn ensure_frontend(
        &self,
        root: &Path,
        out_dir: &Path,
        kind: FrontendKind,
        force: bool,
    ) -> Result<bool> {
        if !force && has_entries(out_dir) {
            self.logger.info(format!(
                "using existing front-end output \u{2192} {}",
                green(out_dir.display().to_string())
            ));
            return Ok(false);
        }
        if !force {
            self.logger.warn(format!(
                "front-end output is missing or empty \u{2192} {}",
                red(out_dir.display().to_string())
            ));
            let question = format!("Run `{}` now?", kind.build_command());
            if !self.prompt.confirm(&question)? {
                return Err(Error::BuildMissing(out_dir.to_path_buf()));
            }
        }
        self.frontend.build(root, kind).await?;
        if !has_entries(out_dir) {
            return Err(Error::BuildMissing(out_dir.to_path_buf()));
        }
        Ok(true)
    }
}

/// Flags of the `start` command.
#[derive(Debug, Clone)]
pub struct StartOptions {
    pub cwd: PathBuf,
    pub port: Option<u16>,
    pub silent: bool,
    pub title: String,
}

/// Flags of the `start-cmd` command.
#[derive(Debug, Clone)]
pub struct StartCmdOptions {
    pub cwd: PathBuf,
    pub commands: String,
    pub silent: bool,
    pub title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerMeta {
    #[serde(default)]
    commands: Option<HashMap<String, String>>,
}

/// Locates the server metadata file: `nitro.json`, then `.output/nitro.json`.
pub fn find_meta_file(cwd: &Path) -> Result<PathBuf> {
    let direct = cwd.join(META_FILE);
    if direct.exists() {
        return Ok(direct);
    }
    let nested = cwd.join(SERVER_OUTPUT_DIR).join(META_FILE);
    if nested.exists() {
        return Ok(nested);
    }
    Err(Error::config(format!(
        "{} not found \u{2192} {} or {}",
        META_FILE,
        direct.display(),
        nested.display()
    )))
}

/// Builds the tagged start command from the server's `commands.preview`.
pub fn resolve_start_spec(meta_file: &Path, options: &StartOptions) -> Result<LaunchSpec> {
    let raw = std::fs::read_to_string(meta_file)?;
    let meta: Option<ServerMeta> = serde_json::from_str(&raw).map_err(|_| {
        Error::config(format!(
            "failed to parse, check its format \u{2192} {}",
            meta_file.display()
        ))
    })?;
    let preview = meta
        .and_then(|meta| meta.commands)
        .and_then(|mut commands| commands.remove("preview"))
        .filter(|preview| !preview.trim().is_empty())
        .ok_or_else(|| {
            Error::config(format!(
                "commands.preview is missing \u{2192} {}",
                meta_file.display()
            ))
        })?;
    let cwd = meta_file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| options.cwd.clone());
    let mut spec = LaunchSpec::parse(&preview)
        .ok_or_else(|| Error::config(format!("invalid preview command `{}`", preview)))?
        .cwd(cwd);
    if let Some(port) = options.port {
        spec = spec.env("NITRO_PORT", port.to_string());
    }
    Ok(spec.tagged(&options.title))
}

/// Splits the comma-separated `--commands` value into a spec.
pub fn resolve_command_spec(options: &StartCmdOptions) -> Result<LaunchSpec> {
    let mut parts: Vec<String> = options
        .commands
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(String::from)
        .collect();
    if parts.is_empty() {
        return Err(Error::config("no command given in --commands"));
    }
    let program = parts.remove(0);
    let spec = LaunchSpec::new(program, parts).cwd(&options.cwd);
    Ok(match &options.title {
        Some(title) => spec.tagged(title),
        None => spec,
    })
}

/// Launches the previously built server.
pub async fn start<L: ProcessLister, T: Terminator>(
    supervisor: &ProcessSupervisor<L, T>,
    options: &StartOptions,
    logger: &Logger,
) -> Result<i32> {
    if let Some(port) = options.port {
        logger.success(format!("port \u{2192} {}", green(port.to_string())));
    }
    let meta_file = find_meta_file(&options.cwd)?;
    let spec = resolve_start_spec(&meta_file, options)?;
    if let Some(cwd) = &spec.cwd {
        logger.success(format!("cwd \u{2192} {}", green(cwd.display().to_string())));
    }
    logger.success(format!("running preview command \u{2192} {}", green(spec.display())));

    let address = format!("http://localhost:{}", service_port(options.port));
    launch(supervisor, &spec, options.silent, Some(&address), logger).await
}

/// Launches an arbitrary comma-separated command.
pub async fn start_cmd<L: ProcessLister, T: Terminator>(
    supervisor: &ProcessSupervisor<L, T>,
    options: &StartCmdOptions,
    logger: &Logger,
) -> Result<i32> {
    let spec = resolve_command_spec(options)?;
    logger.success(format!("cwd \u{2192} {}", green(options.cwd.display().to_string())));
    logger.success(format!("running \u{2192} {}", green(spec.display())));
    launch(supervisor, &spec, options.silent, None, logger).await
}

async fn launch<L: ProcessLister, T: Terminator>(
    supervisor: &ProcessSupervisor<L, T>,
    spec: &LaunchSpec,
    silent: bool,
    address: Option<&str>,
    logger: &Logger,
) -> Result<i32> {
    if silent {
        let pid = supervisor.spawn_detached(spec)?;
        logger.success(format!("running in background \u{2192} pid {}", pid));
        if let Some(address) = address {
            logger.success(format!("service address \u{2192} {}", green(address)));
        }
        return Ok(0);
    }
    if let Some(address) = address {
        logger.success(format!("service address \u{2192} {}", green(address)));
    }
    supervisor.spawn_attached(spec).await
}

fn service_port(port: Option<u16>) -> String {
    port.map(|port| port.to_string())
        .or_else(|| std::env::var("NITRO_PORT").ok())
        .or_else(|| std::env::var("PORT").ok())
        .unwrap_or_else(|| DEFAULT_PORT.to_string())
}

fn has_entries(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::io;

    use super::*;
    use crate::config::CONFIG_FILE;
    use crate::routes::RouteError;

    struct FakePrompt {
        answer: bool,
        asked: Cell<usize>,
    }

    impl FakePrompt {
        fn answering(answer: bool) -> Self {
            Self {
                answer,
                asked: Cell::new(0),
            }
        }
    }

    impl Prompt for FakePrompt {
        fn confirm(&self, _message: &str) -> io::Result<bool> {
            self.asked.set(self.asked.get() + 1);
            Ok(self.answer)
        }
    }

    /// Writes an index.html into the output directory when asked to build.
    #[derive(Default)]
    struct FakeFrontend {
        out_dir: RefCell<Option<PathBuf>>,
        builds: Cell<usize>,
    }

    impl FrontendBuilder for FakeFrontend {
        async fn build(&self, _root: &Path, _kind: FrontendKind) -> Result<()> {
            self.builds.set(self.builds.get() + 1);
            if let Some(dir) = self.out_dir.borrow().as_ref() {
                std::fs::create_dir_all(dir)?;
                std::fs::write(dir.join("index.html"), "<html></html>")?;
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeServer {
        built: RefCell<Vec<(ServerOptions, u16)>>,
    }

    impl ServerBuilder for FakeServer {
        async fn build(&self, options: &ServerOptions, port: u16) -> Result<PathBuf> {
            self.built.borrow_mut().push((options.clone(), port));
            Ok(options.root_dir.join(SERVER_OUTPUT_DIR))
        }
    }

    fn orchestrator(
        answer: bool,
    ) -> LaunchOrchestrator<FakePrompt, FakeFrontend, FakeServer> {
        LaunchOrchestrator::new(
            FakePrompt::answering(answer),
            FakeFrontend::default(),
            FakeServer::default(),
            Logger::new("test"),
        )
    }

    fn project(config: &str, with_output: bool) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), config).unwrap();
        if with_output {
            let out = dir.path().join(DEFAULT_OUT_DIR);
            std::fs::create_dir_all(&out).unwrap();
            std::fs::write(out.join("index.html"), "<html></html>").unwrap();
        }
        dir
    }

    fn config_of(root: &Path) -> Config {
        crate::config::load_project_config(root).unwrap()
    }

    fn options(root: &Path) -> BuildOptions {
        BuildOptions {
            root: root.to_path_buf(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn existing_output_skips_frontend_build() {
        let dir = project("[proxy]\n\"/api\" = \"http://localhost:4000/\"\n", true);
        let orchestrator = orchestrator(false);
        let report = orchestrator.build(config_of(dir.path()), options(dir.path())).await.unwrap();

        assert!(!report.rebuilt_frontend);
        assert_eq!(report.routes, 1);
        assert_eq!(orchestrator.frontend.builds.get(), 0);
        assert_eq!(orchestrator.prompt.asked.get(), 0);

        let built = orchestrator.server.built.borrow();
        assert_eq!(built.len(), 1);
        let (server_options, port) = &built[0];
        assert_eq!(*port, DEFAULT_PORT);
        assert_eq!(server_options.preset, DEFAULT_PRESET);
        assert!(server_options.minify);
        let routes: Vec<(&str, &str)> = server_options
            .route_rules
            .iter()
            .map(|(pattern, rule)| (pattern, rule.proxy.as_str()))
            .collect();
        assert_eq!(routes, vec![("/api/**", "http://localhost:4000/**")]);
        assert_eq!(
            server_options.public_assets[0].dir,
            dir.path().join(DEFAULT_OUT_DIR)
        );
    }

    #[tokio::test]
    async fn declined_rebuild_aborts_before_route_compilation() {
        // The proxy entry is invalid; reaching compilation would yield a route error.
        let dir = project("[proxy]\n\"/api\" = 42\n", false);
        let orchestrator = orchestrator(false);
        let err = orchestrator.build(config_of(dir.path()), options(dir.path())).await.unwrap_err();

        assert!(matches!(err, Error::BuildMissing(_)));
        assert_eq!(orchestrator.prompt.asked.get(), 1);
        assert_eq!(orchestrator.frontend.builds.get(), 0);
        assert!(orchestrator.server.built.borrow().is_empty());
    }

    #[tokio::test]
    async fn accepted_rebuild_runs_frontend_then_server() {
        let dir = project("", false);
        let orchestrator = orchestrator(true);
        *orchestrator.frontend.out_dir.borrow_mut() = Some(dir.path().join(DEFAULT_OUT_DIR));
        let report = orchestrator.build(config_of(dir.path()), options(dir.path())).await.unwrap();

        assert!(report.rebuilt_frontend);
        assert_eq!(report.routes, 0);
        assert_eq!(orchestrator.frontend.builds.get(), 1);
        assert_eq!(orchestrator.server.built.borrow().len(), 1);
    }

    #[tokio::test]
    async fn rebuild_that_produces_nothing_is_build_missing() {
        let dir = project("", false);
        let orchestrator = orchestrator(true);
        let err = orchestrator.build(config_of(dir.path()), options(dir.path())).await.unwrap_err();
        assert!(matches!(err, Error::BuildMissing(_)));
        assert!(orchestrator.server.built.borrow().is_empty());
    }

    #[tokio::test]
    async fn build_uses_the_config_it_is_given() {
        // No nitro-proxy.toml on disk: everything comes from the passed config.
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("web");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("index.html"), "<html></html>").unwrap();
        let config: Config = toml::from_str(
            "out_dir = \"web\"\nport = 4100\n[proxy]\n\"/api\" = \"http://a/\"\n",
        )
        .unwrap();

        let orchestrator = orchestrator(false);
        let report = orchestrator.build(config, options(dir.path())).await.unwrap();
        assert_eq!(report.routes, 1);
        assert!(!report.rebuilt_frontend);
        let built = orchestrator.server.built.borrow();
        assert_eq!(built[0].1, 4100);
        assert_eq!(built[0].0.public_assets[0].dir, out);
    }

    #[tokio::test]
    async fn force_rebuilds_without_asking() {
        let dir = project("out_dir = \"web\"\n", true);
        let orchestrator = orchestrator(false);
        *orchestrator.frontend.out_dir.borrow_mut() = Some(dir.path().join("web"));
        let mut opts = options(dir.path());
        opts.force = true;
        opts.port = Some(8080);
        opts.preset = Some("node-server".into());
        opts.minify = Some(false);
        orchestrator.build(config_of(dir.path()), opts).await.unwrap();

        assert_eq!(orchestrator.prompt.asked.get(), 0);
        assert_eq!(orchestrator.frontend.builds.get(), 1);
        let built = orchestrator.server.built.borrow();
        let (server_options, port) = &built[0];
        assert_eq!(*port, 8080);
        assert_eq!(server_options.preset, "node-server");
        assert!(!server_options.minify);
        assert_eq!(server_options.public_assets[0].dir, dir.path().join("web"));
    }

    #[tokio::test]
    async fn invalid_proxy_target_fails_without_server_build() {
        let dir = project("[proxy]\n\"/api\" = [\"http://a\"]\n", true);
        let orchestrator = orchestrator(false);
        let err = orchestrator.build(config_of(dir.path()), options(dir.path())).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Route(RouteError::InvalidTarget { .. })
        ));
        assert!(orchestrator.server.built.borrow().is_empty());
    }

    #[tokio::test]
    async fn strict_routes_accept_distinct_prefixes() {
        let dir = project(
            "strict_routes = true\n[proxy]\n\"/api\" = \"http://a\"\n",
            true,
        );
        let orchestrator = orchestrator(false);
        assert_eq!(orchestrator.build(config_of(dir.path()), options(dir.path())).await.unwrap().routes, 1);
    }

    #[test]
    fn server_options_serialize_camel_case() {
        let options = ServerOptions {
            root_dir: PathBuf::from("/app"),
            dev: false,
            minify: true,
            preset: DEFAULT_PRESET.into(),
            public_assets: vec![PublicAsset {
                dir: PathBuf::from("/app/dist"),
                max_age: 3600,
            }],
            route_rules: RouteTable::default(),
            experimental: Experimental {
                async_context: true,
            },
            source_map: false,
        };
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["rootDir"], "/app");
        assert_eq!(json["publicAssets"][0]["maxAge"], 3600);
        assert_eq!(json["experimental"]["asyncContext"], true);
        assert_eq!(json["sourceMap"], false);
        assert!(json["routeRules"].as_object().unwrap().is_empty());
    }

    #[test]
    fn build_script_detection() {
        let dir = tempfile::tempdir().unwrap();
        let package = dir.path().join("package.json");

        std::fs::write(
            &package,
            r#"{"scripts": {"dev": "vite", "build:prod": "vue-tsc && vite build --mode prod"}}"#,
        )
        .unwrap();
        let spec = detect_build_script(&package, FrontendKind::Vite);
        assert_eq!(spec.args, vec!["run", "build:prod"]);

        let spec = detect_build_script(&package, FrontendKind::VueCli);
        assert_eq!(spec.args, vec!["vue-cli-service", "build"]);

        std::fs::write(&package, "{ not json").unwrap();
        let spec = detect_build_script(&package, FrontendKind::Vite);
        assert_eq!(spec.args, vec!["vite", "build"]);

        let spec = detect_build_script(&dir.path().join("missing.json"), FrontendKind::Vite);
        assert_eq!(spec.args, vec!["vite", "build"]);
    }

    fn start_options(cwd: &Path) -> StartOptions {
        StartOptions {
            cwd: cwd.to_path_buf(),
            port: Some(4000),
            silent: false,
            title: "nitro-proxy".into(),
        }
    }

    #[test]
    fn start_spec_from_nested_meta_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join(SERVER_OUTPUT_DIR);
        std::fs::create_dir_all(&output).unwrap();
        std::fs::write(
            output.join(META_FILE),
            r#"{"preset":"node-cluster","commands":{"preview":"node ./server/index.mjs"}}"#,
        )
        .unwrap();

        let meta = find_meta_file(dir.path()).unwrap();
        assert_eq!(meta, output.join(META_FILE));
        let spec = resolve_start_spec(&meta, &start_options(dir.path())).unwrap();
        assert_eq!(spec.program, "node");
        assert_eq!(spec.args, vec!["./server/index.mjs", "--title=nitro-proxy"]);
        assert_eq!(spec.cwd.as_deref(), Some(output.as_path()));
        assert_eq!(spec.env, vec![("NITRO_PORT".to_string(), "4000".to_string())]);
    }

    #[test]
    fn start_requires_meta_and_preview() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(find_meta_file(dir.path()), Err(Error::Config(_))));

        let meta = dir.path().join(META_FILE);
        std::fs::write(&meta, r#"{"commands":{"deploy":"npx wrangler"}}"#).unwrap();
        let err = resolve_start_spec(&meta, &start_options(dir.path())).unwrap_err();
        assert!(err.to_string().contains("commands.preview"));

        std::fs::write(&meta, "null").unwrap();
        assert!(resolve_start_spec(&meta, &start_options(dir.path())).is_err());

        std::fs::write(&meta, "{oops").unwrap();
        let err = resolve_start_spec(&meta, &start_options(dir.path())).unwrap_err();
        assert!(err.to_string().contains("check its format"));
    }

    #[test]
    fn command_spec_splits_on_commas() {
        let options = StartCmdOptions {
            cwd: PathBuf::from("/srv"),
            commands: "node, server.mjs,--port,3000".into(),
            silent: true,
            title: None,
        };
        let spec = resolve_command_spec(&options).unwrap();
        assert_eq!(spec.program, "node");
        assert_eq!(spec.args, vec!["server.mjs", "--port", "3000"]);

        let tagged = resolve_command_spec(&StartCmdOptions {
            title: Some("api".into()),
            ..options.clone()
        })
        .unwrap();
        assert_eq!(tagged.args.last().map(String::as_str), Some("--title=api"));

        let empty = StartCmdOptions {
            commands: " , ".into(),
            ..options
        };
        assert!(matches!(resolve_command_spec(&empty), Err(Error::Config(_))));
    }
}
