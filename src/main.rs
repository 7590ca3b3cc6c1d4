//! Entry point: `fsim create <total_kb> <block_kb>` formats a disk image;
//! `fsim run` mounts it and drops into the interactive shell.

use std::env;
use std::process::exit;

use fsim::{fs, shell, DISK_PATH};

fn usage_error(bin: &str) -> ! {
    eprintln!("Usage:");
    eprintln!("  {bin} create <total_kb> <block_kb>");
    eprintln!("  {bin} run");
    exit(1);
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut args = env::args();
    let bin = args.next().unwrap_or_else(|| "fsim".to_string());
    let Some(mode) = args.next() else {
        usage_error(&bin);
    };

    match mode.as_str() {
        "create" => {
            let (Some(total_kb), Some(block_kb)) = (args.next(), args.next()) else {
                eprintln!("Usage: {bin} create <total_kb> <block_kb>");
                exit(1);
            };
            let total_kb: u32 = total_kb.parse().unwrap_or_else(|_| {
                eprintln!("{bin}: '{total_kb}' is not a valid size in KB");
                exit(1);
            });
            let block_kb: u32 = block_kb.parse().unwrap_or_else(|_| {
                eprintln!("{bin}: '{block_kb}' is not a valid size in KB");
                exit(1);
            });
            if let Err(e) = fs::format(DISK_PATH, total_kb, block_kb) {
                eprintln!("FATAL: failed to format disk: {e}");
                exit(1);
            }
            println!("Disk formatted successfully.");
        }
        "run" => {
            let mut session = fs::FileSystem::mount(DISK_PATH).unwrap_or_else(|e| {
                eprintln!(
                    "FATAL: failed to mount disk: {e}. Does '{DISK_PATH}' exist and was it \
                     formatted with 'create'?"
                );
                exit(1);
            });
            println!("Disk '{DISK_PATH}' mounted successfully. Welcome!");
            if let Err(e) = shell::run(&mut session) {
                eprintln!("FATAL: shell I/O error: {e}");
                exit(1);
            }
            if let Err(e) = session.unmount() {
                eprintln!("FATAL: failed to unmount cleanly: {e}");
                exit(1);
            }
            println!("Disk unmounted. Goodbye.");
        }
        other => {
            eprintln!("{bin}: unknown command: {other}");
            usage_error(&bin);
        }
    }
}
