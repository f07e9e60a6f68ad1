// Command line driver.

use adump::pdump::HexDump;
use adump::pool::{self, ChunkSink, ChunkSource, SqlPool};
use adump::store::walk::{walk, Visit, VisitResult, Visitor};
use adump::{cache, dump, restore, Oid, Result};
use std::collections::BTreeMap;
use std::env;
use std::process;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        usage();
    }

    let result = match &args[1][..] {
        "create" => cmd_create(&args[2..]),
        "list" => cmd_list(&args[2..]),
        "dump" => cmd_dump(&args[2..]),
        "restore" => cmd_restore(&args[2..]),
        "regen" => cmd_regen(&args[2..]),
        "show" => cmd_show(&args[2..]),
        _ => usage(),
    };

    if let Err(err) = result {
        eprintln!("adump: {}", err);
        process::exit(1);
    }
}

fn usage() -> ! {
    eprintln!("usage: adump create <pool>");
    eprintln!("       adump list <pool>");
    eprintln!("       adump dump <pool> <dir> <fsuuid> [key=value ...]");
    eprintln!("       adump restore <pool> <oid> <dest>");
    eprintln!("       adump regen <pool> <oid>");
    eprintln!("       adump show <pool> <oid>");
    process::exit(2);
}

fn cmd_create(args: &[String]) -> Result<()> {
    if args.len() != 1 {
        usage();
    }
    SqlPool::create(&args[0])
}

fn cmd_list(args: &[String]) -> Result<()> {
    if args.len() != 1 {
        usage();
    }
    let pool = pool::open(&args[0])?;

    let mut lister = Lister { nodes: vec![] };
    for id in pool.backups()? {
        walk(&pool, &id, &mut lister)?;
    }

    lister.nodes.sort_by_key(|n| n.date);
    for node in &lister.nodes {
        print!("{} {}", node.oid.to_hex(), format_date(node.date));
        for (k, v) in &node.props {
            if k == "hash" {
                continue;
            }
            print!(" {}={}", k, v);
        }
        println!();
    }
    Ok(())
}

struct BackNode {
    oid: Oid,
    date: i64,
    props: BTreeMap<String, String>,
}

struct Lister {
    nodes: Vec<BackNode>,
}

impl Visitor for Lister {
    fn back(&mut self, root: &Oid, date: i64, props: &BTreeMap<String, String>) -> VisitResult {
        self.nodes.push(BackNode {
            oid: *root,
            date,
            props: props.clone(),
        });
        // Only the roots are wanted.
        Ok(Visit::Prune)
    }
}

// Render nanoseconds since the epoch as a calendar date, avoiding a
// timezone dependency by staying in UTC.
fn format_date(nanos: i64) -> String {
    let secs = nanos.div_euclid(1_000_000_000);
    let days = secs.div_euclid(86400);
    let rem = secs.rem_euclid(86400);

    // Civil-from-days, Howard Hinnant's algorithm.
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };

    format!("{:04}-{:02}-{:02}_{:02}:{:02}",
            y, m, d, rem / 3600, (rem % 3600) / 60)
}

fn cmd_dump(args: &[String]) -> Result<()> {
    if args.len() < 3 {
        usage();
    }

    let mut props = BTreeMap::new();
    for arg in &args[3..] {
        let fields: Vec<&str> = arg.splitn(2, '=').collect();
        if fields.len() != 2 {
            usage();
        }
        props.insert(fields[0].to_owned(), fields[1].to_owned());
    }

    let pool = pool::open(&args[0])?;
    let summary = dump::run(&pool, &args[1], &args[2], &props)?;
    println!("{} chunks, {} bytes ({} compressed), {} files read, {} reused ({} bytes)",
             summary.chunks,
             summary.bytes,
             summary.zbytes,
             summary.files_read,
             summary.files_reused,
             summary.bytes_reused);
    println!("{}", summary.root.to_hex());
    pool.close()
}

fn cmd_restore(args: &[String]) -> Result<()> {
    if args.len() != 3 {
        usage();
    }

    let pool = pool::open(&args[0])?;
    let id = Oid::from_hex(&args[1])?;
    restore::run(&pool, &id, &args[2])
}

fn cmd_show(args: &[String]) -> Result<()> {
    if args.len() != 2 {
        usage();
    }

    let pool = pool::open(&args[0])?;
    let id = Oid::from_hex(&args[1])?;
    let chunk = pool.search(&id)?;
    println!("{} {} ({} bytes)", chunk.oid().to_hex(), chunk.kind(), chunk.data_len());
    chunk.data()?.dump();
    Ok(())
}

fn cmd_regen(args: &[String]) -> Result<()> {
    if args.len() != 2 {
        usage();
    }

    let pool = pool::open(&args[0])?;
    let id = Oid::from_hex(&args[1])?;
    cache::regenerate(&pool, &id)?;
    pool.flush()?;
    pool.close()
}
