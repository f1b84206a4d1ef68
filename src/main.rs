//! cephfs-oss command line entry point
//!
//! Drives the adapter the way a data server would, against the local
//! passthrough client, for one command per invocation.

use std::io::{self, Read, Write};
use std::path::PathBuf;

use tracing::{debug, error};

use cephfs_oss::adapter::CephAdapter;
use cephfs_oss::layout::OpenEnv;
use cephfs_oss::plugin::{CreateOptions, StorageHandle, StorageSystem};
use cephfs_oss::Result;

const CHUNK: usize = 1 << 20;

/// Print usage information
fn print_usage() {
    eprintln!("Usage: cephfs-oss <config> <command> [args]");
    eprintln!();
    eprintln!("cephfs-oss - Storage-plugin adapter for a mounted distributed filesystem");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  stat <path>            Show metadata of a path");
    eprintln!("  ls <path>              List a directory");
    eprintln!("  statfs <path>          Show the space report");
    eprintln!("  mkdir [-p] <path>      Create a directory");
    eprintln!("  cat <path>             Write a file to stdout");
    eprintln!("  put <path> [opaque]    Store stdin into a file, with optional layout options");
    eprintln!("  rm <path>              Remove a file");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  cephfs-oss /etc/xrootd/cephfs.cfg put /data/f 'cephfs.stripe_count=4' < f");
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        print_usage();
        std::process::exit(1);
    }

    let config_path = PathBuf::from(&args[1]);
    let oss = CephAdapter::global();

    if let Err(e) = oss.init(&config_path) {
        eprintln!("Failed to initialize: {} (retc={})", e, e.retc());
        std::process::exit(1);
    }

    let result = run(&oss, &args[2], &args[3..]);
    oss.manager().shutdown();

    match result {
        Ok(true) => {}
        Ok(false) => {
            eprintln!("Bad arguments for '{}'", args[2]);
            print_usage();
            std::process::exit(1);
        }
        Err(e) => {
            error!("{} failed: {}", args[2], e);
            eprintln!("{}: {} (retc={})", args[2], e, e.retc());
            std::process::exit(1);
        }
    }
}

/// Run one command. Returns false when the arguments do not form one.
fn run(oss: &CephAdapter, command: &str, args: &[String]) -> Result<bool> {
    debug!("running {} {:?}", command, args);
    let mut stdout = io::stdout().lock();

    match (command, args) {
        ("stat", [path]) => {
            let st = oss.stat(path)?;
            writeln!(
                stdout,
                "{} ino={} mode={:o} nlink={} uid={} gid={} size={}",
                path, st.ino, st.mode, st.nlink, st.uid, st.gid, st.size
            )?;
        }
        ("ls", [path]) => {
            let dir = oss.new_dir("cli")?;
            dir.opendir(path, &OpenEnv::new())?;
            let mut name = vec![0u8; 4096];
            loop {
                let n = dir.readdir(&mut name)?;
                if n == 0 {
                    break;
                }
                stdout.write_all(&name[..n])?;
                stdout.write_all(b"\n")?;
            }
            dir.close()?;
        }
        ("statfs", [path]) => {
            writeln!(stdout, "{}", oss.stat_fs_report(path)?)?;
        }
        ("mkdir", [flag, path]) if flag == "-p" => oss.mkdir(path, 0o755, true)?,
        ("mkdir", [path]) => oss.mkdir(path, 0o755, false)?,
        ("cat", [path]) => {
            let file = oss.new_file("cli")?;
            file.open(path, libc::O_RDONLY, 0, &OpenEnv::new())?;
            let mut buf = vec![0u8; CHUNK];
            let mut offset = 0u64;
            loop {
                let n = file.read(&mut buf, offset)?;
                if n == 0 {
                    break;
                }
                stdout.write_all(&buf[..n])?;
                offset += n as u64;
            }
            file.close()?;
        }
        ("put", [path, rest @ ..]) if rest.len() <= 1 => {
            let env = rest.first().map(|cgi| OpenEnv::from_cgi(cgi)).unwrap_or_default();
            oss.create("cli", path, 0o644, &env, CreateOptions::default())?;

            let file = oss.new_file("cli")?;
            file.open(path, libc::O_WRONLY | libc::O_TRUNC, 0o644, &env)?;
            let mut stdin = io::stdin().lock();
            let mut buf = vec![0u8; CHUNK];
            let mut offset = 0u64;
            loop {
                let n = stdin.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                let mut written = 0;
                while written < n {
                    match file.write(&buf[written..n], offset + written as u64)? {
                        0 => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                        w => written += w,
                    }
                }
                offset += n as u64;
            }
            file.fsync()?;
            file.close()?;
        }
        ("rm", [path]) => oss.unlink(path)?,
        _ => return Ok(false),
    }

    Ok(true)
}
