use clap::Parser;
use std::{
    error::Error,
    io::{self, Write},
    net::TcpStream,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use log::{debug, info};
use respite::{
    Arg, Connection, FixedPool, Input, Pool, TcpConnector, ToArg, cli::print_reply, prompt,
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server hostname or IP address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = 6379)]
    port: u16,

    /// Connect timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Number of parallel connections used to run the command
    #[arg(short, long, default_value_t = 1)]
    clients: usize,

    /// Number of times the command is executed
    #[arg(short, long, default_value_t = 1)]
    repeat: usize,

    /// Command and arguments; an interactive prompt starts when omitted
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize env_logger; For logging to STDOUT/STDERR
    env_logger::init();

    let cli = Cli::parse();
    let address = format!("{}:{}", cli.host, cli.port);
    let connector =
        TcpConnector::new(address.as_str()).with_timeout(Duration::from_millis(cli.timeout_ms));

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || {
            if interrupted.swap(true, Ordering::SeqCst) {
                // Second interrupt while blocked on input or the network.
                std::process::exit(130);
            }
        })?;
    }

    if cli.command.is_empty() {
        let conn = Connection::open(&connector)?;
        interactive(&conn, &address, &interrupted)?;
        return Ok(conn.close()?);
    }

    let pool = FixedPool::new(connector, cli.clients.max(1))?;
    run_repeated(&pool, &cli.command, cli.repeat, &interrupted)
}

fn interactive(
    conn: &Connection<TcpStream>,
    banner: &str,
    interrupted: &AtomicBool,
) -> Result<(), Box<dyn Error>> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    while !interrupted.load(Ordering::SeqCst) {
        let words = match prompt(stdin.lock(), stdout.lock(), banner) {
            Ok(Input::Exit) => break,
            Ok(Input::Empty) => continue,
            Ok(Input::Command(words)) => words,
            Err(e) => {
                eprintln!("error: {e}");
                continue;
            }
        };

        let reply = conn.call(&to_args(&words));
        print_reply(stdout.lock(), &reply)?;
        if let Err(e) = reply {
            if e.is_fatal() {
                return Err(e.into());
            }
        }
    }

    stdout.flush()?;
    Ok(())
}

fn run_repeated<P: Pool + Sync>(
    pool: &P,
    words: &[String],
    repeat: usize,
    interrupted: &AtomicBool,
) -> Result<(), Box<dyn Error>> {
    let args = to_args(words);
    let issued = AtomicUsize::new(0);
    let started = Instant::now();

    let outcome = thread::scope(|scope| {
        let workers = (0..pool.size())
            .map(|i| {
                let (args, issued) = (&args, &issued);
                scope.spawn(move || -> Result<(), respite::Error> {
                    debug!("client {i} started");
                    while !interrupted.load(Ordering::SeqCst)
                        && issued.fetch_add(1, Ordering::SeqCst) < repeat
                    {
                        let reply = pool.borrow(|conn| Ok(conn.call(args)))?;
                        print_reply(io::stdout().lock(), &reply)?;
                        if let Err(e) = reply {
                            if e.is_fatal() {
                                return Err(e);
                            }
                        }
                    }
                    Ok(())
                })
            })
            .collect::<Vec<_>>();

        workers
            .into_iter()
            .map(|worker| worker.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .find(|result| result.as_ref().is_err_and(|e| e.is_fatal()))
            .unwrap_or(Ok(()))
    });

    if repeat > 1 {
        info!("ran {repeat} requests in {:?}", started.elapsed());
    }
    Ok(outcome?)
}

fn to_args<A: ToArg>(words: &[A]) -> Vec<Arg<'_>> {
    words.iter().map(ToArg::to_arg).collect()
}
