use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::{error, info};

use conspire::cli::Args;
use conspire::lobby::Lobby;
use conspire::statistics::Statistics;
use conspire::supervisor::{Activities, BoxedUnit, Supervisor};
use conspire::{HttpServer, PeriodicWorker, ServerConfig, endpoints, pidfile, signals};

fn main() {
    let args = Args::parse();

    // Initialize logger with custom format for daemon
    env_logger::Builder::new()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .init();

    if let Err(e) = run(args) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut cfg = ServerConfig::discover(args.config.as_deref())?;
    args.apply(&mut cfg);
    cfg.validate()?;

    let gate = signals::install()?;

    let statistics = Arc::new(Statistics::new(cfg.statistics.history));
    let lobby = Arc::new(Lobby::new(cfg.keepalive.peer_timeout(), statistics.clone()));

    let supervisor = Supervisor::new(gate, pidfile::global(), cfg.pid_file.clone(), &cfg.shutdown);
    let report = supervisor.run(|| {
        let routes = endpoints::presence_routes(&cfg, lobby.clone(), statistics.clone());
        let server = HttpServer::bind(cfg.listen_addr(), routes)?;

        info!(
            "Conspire presence server v{} starting up",
            env!("CARGO_PKG_VERSION")
        );
        info!(
            "clients are expected to connect at http://{}/",
            server.local_addr()
        );
        info!("canonical base URL={}", cfg.canonical_base_url());
        info!("statistics URL={}", cfg.stats_url());

        let keepalive_lobby = lobby.clone();
        let keepalive: BoxedUnit = Box::new(move || {
            keepalive_lobby.ping_peers();
            Ok(())
        });
        let stats = statistics.clone();
        let aggregate: BoxedUnit = Box::new(move || stats.aggregate().map(|_| ()));

        Ok(Activities {
            server: Arc::new(server),
            keepalive: PeriodicWorker::new(cfg.keepalive.worker_config()?, keepalive),
            statistics: PeriodicWorker::new(cfg.statistics.worker_config()?, aggregate),
        })
    })?;

    log::debug!("Shutdown report: {report:?}");
    Ok(())
}
