use clap::Parser;
use o365beat::domain::ports::EventSink;
use o365beat::utils::{logger, validation::Validate};
use o365beat::{Beat, BeatConfig, BeatError, CliArgs, ConsoleSink, FileRegistry, FileSink};

fn build_sink(config: &BeatConfig) -> Result<Box<dyn EventSink>, BeatError> {
    match config.output.r#type.as_str() {
        "console" => Ok(Box::new(ConsoleSink)),
        "file" => {
            let path = config
                .output
                .path
                .as_deref()
                .ok_or_else(|| BeatError::MissingConfigError {
                    field: "output.path".to_string(),
                })?;
            Ok(Box::new(FileSink::new(path)))
        }
        other => Err(BeatError::InvalidConfigValueError {
            field: "output.type".to_string(),
            value: other.to_string(),
            reason: "Supported output types: console, file".to_string(),
        }),
    }
}

fn fail(e: &BeatError) -> ! {
    tracing::error!(
        "❌ o365beat failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    let exit_code = match e.severity() {
        o365beat::utils::error::ErrorSeverity::Low => 1,
        o365beat::utils::error::ErrorSeverity::Medium => 2,
        o365beat::utils::error::ErrorSeverity::High => 1,
        o365beat::utils::error::ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // 初始化日誌
    logger::init_cli_logger(args.verbose);

    tracing::info!("Starting o365beat");
    if args.verbose {
        tracing::debug!("CLI args: {:?}", args);
    }

    // 載入並驗證配置
    let config = match BeatConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Could not load configuration from {}: {}", args.config, e);
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    let monitor_enabled = args.monitor || config.monitoring_enabled();
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    // 組裝 registry、sink 與 beat 引擎
    let registry = FileRegistry::new(config.registry_file_path());
    let sink = match build_sink(&config) {
        Ok(sink) => sink,
        Err(e) => fail(&e),
    };

    let beat = match Beat::new_with_monitoring(&config, registry, sink, monitor_enabled) {
        Ok(beat) => beat,
        Err(e) => fail(&e),
    };

    if args.once {
        match beat.run_once().await {
            Ok(()) => {
                tracing::info!("✅ Poll cycle completed successfully");
                println!("✅ Poll cycle completed successfully");
            }
            Err(e) => fail(&e),
        }
        return Ok(());
    }

    // ctrl-c 轉成 shutdown 訊號，讓 run() 正常收尾後以 0 退出
    let shutdown = beat.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            shutdown.shutdown();
        }
    });

    match beat.run().await {
        Ok(()) => Ok(()),
        Err(e) => fail(&e),
    }
}
