//! 命令行入口
//!
//! `audio-guide [-v] <command>`，子命令与流水线操作一一对应。

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use heritage_audio_guide::models::{load_track_definition, OptionOverrides};
use heritage_audio_guide::orchestrator::{self, pipeline_runner, track_runner};
use heritage_audio_guide::services::{PromptKind, PromptLoader};
use heritage_audio_guide::{Config, RunMode, RunScope, Stage, StageCtx, StageFlow, StageSelection};

#[derive(Debug, Parser)]
#[command(
    name = "audio-guide",
    version,
    about = "文化遗产语音导览生成器：关键词 → 资料 → 讲解词 → 语音"
)]
pub struct Cli {
    /// 输出调试日志
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 为一个关键词执行选中的阶段（默认 1,2,3）
    Run(RunArgs),
    /// 只执行第1阶段：信息检索
    Info(StageArgs),
    /// 只执行第2阶段：讲解词生成（需要已有资料）
    Script(StageArgs),
    /// 只执行第3阶段：语音合成（需要已有讲解词）
    Audio(StageArgs),
    /// 按轨道文件批量执行
    Track(TrackArgs),
    /// 列出可用的提示词版本
    Prompts(PromptsArgs),
}

#[derive(Debug, Args, Clone)]
struct TargetArgs {
    /// 关键词（文化遗产名称）
    #[arg(long)]
    keyword: String,
    /// 输出文件名（默认使用关键词）
    #[arg(long)]
    output_name: Option<String>,
    /// 模拟模式，不调用任何外部服务
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Args, Clone, Default)]
struct OptionFlags {
    /// 文本模型
    #[arg(long)]
    model: Option<String>,
    /// TTS 音色
    #[arg(long)]
    voice: Option<String>,
    /// TTS 模型
    #[arg(long)]
    tts_model: Option<String>,
    /// 语速
    #[arg(long)]
    speed: Option<f32>,
    /// 采样温度
    #[arg(long)]
    temperature: Option<f32>,
    /// 讲解词提示词版本
    #[arg(long)]
    prompt_version: Option<String>,
    /// 信息检索提示词版本
    #[arg(long)]
    info_prompt_version: Option<String>,
    /// 最大尝试次数
    #[arg(long)]
    max_retries: Option<u32>,
    /// 初始退避（秒）
    #[arg(long)]
    initial_wait: Option<f64>,
    /// 最大退避（秒）
    #[arg(long)]
    max_wait: Option<f64>,
}

impl From<OptionFlags> for OptionOverrides {
    fn from(flags: OptionFlags) -> Self {
        OptionOverrides {
            model: flags.model,
            info_prompt_version: flags.info_prompt_version,
            prompt_version: flags.prompt_version,
            temperature: flags.temperature,
            voice: flags.voice,
            tts_model: flags.tts_model,
            speed: flags.speed,
            max_retries: flags.max_retries,
            initial_wait: flags.initial_wait,
            max_wait: flags.max_wait,
        }
    }
}

#[derive(Debug, Args, Clone)]
struct RunArgs {
    #[command(flatten)]
    target: TargetArgs,
    /// 阶段选择，例如 "1,2,3" 或 "2,3"
    #[arg(long, default_value = "1,2,3")]
    stages: String,
    #[command(flatten)]
    options: OptionFlags,
}

#[derive(Debug, Args, Clone)]
struct StageArgs {
    #[command(flatten)]
    target: TargetArgs,
    #[command(flatten)]
    options: OptionFlags,
}

#[derive(Debug, Args, Clone)]
struct TrackArgs {
    /// 轨道定义文件（TOML）
    #[arg(long)]
    track_file: PathBuf,
    /// 每个条目执行的阶段
    #[arg(long, default_value = "1,2,3")]
    stages: String,
    /// 强制模拟模式
    #[arg(long)]
    dry_run: bool,
    /// 作用于所有条目，轨道 defaults 与条目中写明的键优先
    #[command(flatten)]
    options: OptionFlags,
}

#[derive(Debug, Args, Clone)]
struct PromptsArgs {
    /// info 或 script，缺省时两类都列出
    #[arg(long)]
    kind: Option<String>,
}

impl Cli {
    pub async fn run(self, config: &Config) -> Result<()> {
        match self.command {
            Command::Run(args) => {
                let stages = StageSelection::parse(&args.stages)?;
                run_single(config, args.target, args.options, stages).await
            }
            Command::Info(args) => run_stage(config, Stage::Info, args).await,
            Command::Script(args) => run_stage(config, Stage::Script, args).await,
            Command::Audio(args) => run_stage(config, Stage::Audio, args).await,
            Command::Track(args) => run_track(config, args).await,
            Command::Prompts(args) => list_prompts(config, args).await,
        }
    }
}

async fn run_stage(config: &Config, stage: Stage, args: StageArgs) -> Result<()> {
    let stages = StageSelection::from_stages([stage])?;
    run_single(config, args.target, args.options, stages).await
}

async fn run_single(
    config: &Config,
    target: TargetArgs,
    flags: OptionFlags,
    stages: StageSelection,
) -> Result<()> {
    let options = OptionOverrides::from(flags).resolve();
    let mode = RunMode::from_dry_run(target.dry_run);
    let ctx = StageCtx::new(
        &target.keyword,
        target.output_name.as_deref(),
        mode,
        &config.output_root,
        &RunScope::Standalone,
    )?;

    let flow = StageFlow::new(config)?;
    let run = pipeline_runner::run_stages(&flow, &ctx, &options, &stages).await?;

    for artifact in &run.artifacts {
        println!("{}: {}", artifact.stage, artifact.path.display());
    }
    Ok(())
}

async fn run_track(config: &Config, args: TrackArgs) -> Result<()> {
    let stages = StageSelection::parse(&args.stages)?;
    let track = load_track_definition(&args.track_file)
        .await
        .with_context(|| format!("无法加载轨道文件: {}", args.track_file.display()))?;
    let mode = orchestrator::effective_mode(&track, args.dry_run);
    let cli_options = OptionOverrides::from(args.options);

    let flow = StageFlow::new(config)?;
    let result = track_runner::run_track(
        &flow,
        &track,
        &stages,
        mode,
        &cli_options,
        &config.output_root,
    )
    .await;
    match result {
        Ok(outcome) => {
            println!("{}", outcome.report_path.display());
            Ok(())
        }
        Err(failure) => {
            if let Some(path) = &failure.report_path {
                eprintln!("部分报告: {}", path.display());
            }
            Err(failure.into())
        }
    }
}

async fn list_prompts(config: &Config, args: PromptsArgs) -> Result<()> {
    let kinds = match args.kind.as_deref() {
        Some(raw) => vec![PromptKind::parse(raw)
            .with_context(|| format!("未知的提示词类型: {raw}（可选 info, script）"))?],
        None => vec![PromptKind::Info, PromptKind::Script],
    };

    let loader = PromptLoader::new(&config.prompt_dir);
    for kind in kinds {
        let versions = loader.list(kind).await;
        info!("📝 {}: {} 个版本", kind.dir_name(), versions.len());
        println!("{}:", kind.dir_name());
        for version in versions {
            println!("  - {version}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_accepts_option_flags() {
        let cli = Cli::try_parse_from([
            "audio-guide",
            "track",
            "--track-file",
            "tracks/sample_track.toml",
            "--stages",
            "2,3",
            "--voice",
            "Kore",
            "--max-retries",
            "3",
            "--dry-run",
        ])
        .unwrap();

        let Command::Track(args) = cli.command else {
            panic!("应解析为 track 子命令");
        };
        assert!(args.dry_run);
        assert_eq!(args.stages, "2,3");
        let overrides = OptionOverrides::from(args.options);
        assert_eq!(overrides.voice.as_deref(), Some("Kore"));
        assert_eq!(overrides.max_retries, Some(3));
        assert_eq!(overrides.model, None);
    }

    #[test]
    fn test_run_defaults_to_all_stages() {
        let cli = Cli::try_parse_from(["audio-guide", "-v", "run", "--keyword", "불국사"]).unwrap();
        assert!(cli.verbose);
        let Command::Run(args) = cli.command else {
            panic!("应解析为 run 子命令");
        };
        assert_eq!(args.stages, "1,2,3");
        assert_eq!(args.target.keyword, "불국사");
        assert!(!args.target.dry_run);
    }
}
