// SPDX-License-Identifier: Apache-2.0 OR MIT

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tempusd::config::Config;
use tempusd::logging::{Facility, Logger, Severity};
use tempusd::netio::IoContext;
use tempusd::recvbuf::RecvBufPool;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the JSON5 configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured UDP port
    #[arg(long)]
    port: Option<u16>,

    /// Listen on this interface only
    #[arg(long)]
    interface: Option<String>,

    /// Accept interface aliases (names containing ':')
    #[arg(long)]
    listen_virtual: bool,

    /// Minimum log severity (emergency..debug)
    #[arg(long, default_value = "info")]
    log_level: Severity,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let logger = Logger::stderr();
    logger.set_global_level(args.log_level);

    let mut cfg = match &args.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(port) = args.port {
        cfg.port = port;
    }
    if let Some(iface) = args.interface {
        cfg.interface = Some(iface);
    }
    if args.listen_virtual {
        cfg.listen_virtual = true;
    }
    cfg.validate()?;

    let pool = Arc::new(RecvBufPool::new(cfg.recv_buffers, logger.clone()));
    let mut ctx = IoContext::new(&cfg, pool, logger.clone());
    ctx.discover_and_bind()?;

    if cfg.broadcast_client {
        ctx.enable_broadcast_client();
    }
    for group in &cfg.multicast_groups {
        if let Err(e) = ctx.multicast_add(*group) {
            logger.error(Facility::Daemon, &format!("{:#}", e));
        }
    }

    logger.info(
        Facility::Daemon,
        &format!("tempusd running on port {}", cfg.port),
    );

    // Termination is the process supervisor's job (default SIGTERM
    // disposition); this loop runs until then.
    run_loop(&mut ctx, &cfg, &logger)
}

fn run_loop(ctx: &mut IoContext, cfg: &Config, logger: &Logger) -> Result<()> {
    let stats_interval = Duration::from_secs(cfg.stats_interval_secs);
    let mut last_stats = Instant::now();

    loop {
        let now = SystemTime::now();
        let handled = ctx.poll_and_receive(now);

        // Drain the arrival queue. A protocol engine would parse and
        // respond here; this binary only accounts and recycles.
        while let Some(buf) = ctx.pool().consume_full() {
            if let Some(from) = buf.src_addr {
                logger.debug(
                    Facility::Daemon,
                    &format!("{} bytes from {}", buf.len, from),
                );
            }
            ctx.pool().release(buf);
        }

        if cfg.stats_interval_secs > 0 && last_stats.elapsed() >= stats_interval {
            let s = ctx.stats();
            logger.info(
                Facility::Stats,
                &format!(
                    "[STATS: recv={} ignored={} dropped={} sent={} notsent={} \
                     handler_calls={} handler_pkts={} buffers={}/{}]",
                    s.packets_received,
                    s.packets_ignored,
                    s.packets_dropped,
                    s.packets_sent,
                    s.packets_notsent,
                    s.handler_calls,
                    s.handler_pkts,
                    ctx.pool().free_count(),
                    ctx.pool().total_count(),
                ),
            );
            last_stats = Instant::now();
        }

        if handled == 0 {
            // Nothing arrived on this pass; don't spin
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}
