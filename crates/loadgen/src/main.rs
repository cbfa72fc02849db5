mod zipfian;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use clap::Parser;
use rand::Rng;
use tokio::io::{self, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing_subscriber::EnvFilter;

use proxy_server::resp::{self, Value};
use zipfian::ZipfianGenerator;

/// RESP load generator: Zipfian tenant traffic through the proxy.
#[derive(Parser)]
#[command(name = "loadgen")]
struct Args {
    /// Proxy address to connect to
    #[arg(long, default_value = "127.0.0.1:6378")]
    proxy_addr: String,

    /// Number of distinct tenants to AUTH as
    #[arg(long, default_value_t = 4)]
    tenants: u64,

    /// Number of unique keys per tenant
    #[arg(long, default_value_t = 10_000)]
    num_keys: u64,

    /// Commands to issue per connection
    #[arg(long, default_value_t = 1_000)]
    ops: u64,

    /// Concurrent connections
    #[arg(long, default_value_t = 8)]
    concurrency: u64,

    /// Zipfian alpha (skewness)
    #[arg(long, default_value_t = 0.8)]
    alpha: f64,

    /// Fraction of commands that are writes
    #[arg(long, default_value_t = 0.2)]
    write_ratio: f64,
}

/// Shared run totals (atomic counters).
#[derive(Default)]
struct Totals {
    requests: AtomicU64,
    errors: AtomicU64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Arc::new(Args::parse());
    let totals = Arc::new(Totals::default());

    tracing::info!(
        proxy = %args.proxy_addr,
        tenants = args.tenants,
        concurrency = args.concurrency,
        ops = args.ops,
        alpha = args.alpha,
        "loadgen starting"
    );

    let mut workers = Vec::new();
    for worker in 0..args.concurrency {
        let args = Arc::clone(&args);
        let totals = Arc::clone(&totals);
        workers.push(tokio::spawn(run_worker(worker, args, totals)));
    }
    for handle in workers {
        let _ = handle.await;
    }

    tracing::info!(
        requests = totals.requests.load(Ordering::Relaxed),
        errors = totals.errors.load(Ordering::Relaxed),
        "loadgen finished"
    );
}

async fn run_worker(worker: u64, args: Arc<Args>, totals: Arc<Totals>) {
    let tenant = format!("tenant{}", worker % args.tenants.max(1));

    let mut stream = match TcpStream::connect(&args.proxy_addr).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(error = %e, worker, "connect failed");
            totals.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    let mut buf = BytesMut::with_capacity(4096);

    // AUTH pins this connection to the tenant namespace; the backend's
    // verdict on the credentials is irrelevant to the proxy-side prefix.
    let auth = Value::array(vec![Value::bulk("AUTH"), Value::bulk(tenant.clone())]);
    if let Err(e) = send_and_recv(&mut stream, &mut buf, &auth).await {
        tracing::error!(error = %e, worker, "AUTH round-trip failed");
        totals.errors.fetch_add(1, Ordering::Relaxed);
        return;
    }

    let mut zipf = ZipfianGenerator::new(args.num_keys.max(1), args.alpha);
    let write_ratio = args.write_ratio.clamp(0.0, 1.0);

    for _ in 0..args.ops {
        let key = format!("item:{}", zipf.next_id());
        let command = if rand::thread_rng().gen_bool(write_ratio) {
            Value::array(vec![Value::bulk("SET"), Value::bulk(key), Value::bulk("x")])
        } else {
            Value::array(vec![Value::bulk("GET"), Value::bulk(key)])
        };

        match send_and_recv(&mut stream, &mut buf, &command).await {
            Ok(_) => {
                totals.requests.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::warn!(error = %e, worker, tenant = %tenant, "command failed");
                totals.errors.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
    }
}

/// Write one command and read one complete reply.
async fn send_and_recv(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    command: &Value,
) -> io::Result<Value> {
    stream.write_all(&resp::encode_to_bytes(command)).await?;
    loop {
        if let Some((reply, _)) =
            resp::decode(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        {
            return Ok(reply);
        }
        if stream.read_buf(buf).await? == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
    }
}
