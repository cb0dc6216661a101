mod cli;

use std::process::ExitCode;

use clap::Parser;
use tracing::warn;

use heritage_audio_guide::utils::logging;
use heritage_audio_guide::{AppError, Config};

#[tokio::main]
async fn main() -> ExitCode {
    // .env 不存在时忽略
    let _ = dotenvy::dotenv();

    let cli = cli::Cli::parse();

    // 初始化日志
    logging::init(cli.verbose);

    // 加载配置
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            print_error(&anyhow::Error::from(e));
            return ExitCode::from(1);
        }
    };

    tokio::select! {
        result = cli.run(&config) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                print_error(&e);
                ExitCode::from(1)
            }
        },
        _ = tokio::signal::ctrl_c() => {
            warn!("⚠️ 收到中断信号，已停止");
            ExitCode::from(130)
        }
    }
}

fn print_error(err: &anyhow::Error) {
    eprintln!("❌ {err}");
    let Some(app) = err.chain().find_map(|e| e.downcast_ref::<AppError>()) else {
        return;
    };
    if app.to_string() != err.to_string() {
        eprintln!("   原因: {app}");
    }
    eprintln!("   分类: {}", app.classification());
    if let Some(hint) = app.remediation_hint() {
        eprintln!("   建议: {hint}");
    }
}
