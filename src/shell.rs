//! The interactive command shell: tokenizes a line of input and dispatches
//! it against a mounted [`crate::fs::FileSystem`]. This is the "external
//! shell collaborator" the engine itself does not depend on; it is kept
//! thin and built only on the public `fs` API.

use std::io::{self, Write};

use crate::error::FsError;
use crate::fs::{FileSystem, WriteMode};
use crate::inode::InodeType;

/// Runs the interactive shell against `fs` until `exit` or end-of-input.
pub fn run(fs: &mut FileSystem) -> io::Result<()> {
    println!("Filesystem shell started. Type 'exit' to leave.");
    let stdin = io::stdin();
    loop {
        print!("fs:{}$ ", fs.get_current_path());
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            println!("exit");
            return Ok(());
        }
        let line = line.trim_end_matches(['\n', '\r']);

        match dispatch(fs, line) {
            Dispatch::Continue => {}
            Dispatch::Exit => return Ok(()),
        }
    }
}

enum Dispatch {
    Continue,
    Exit,
}

fn dispatch(fs: &mut FileSystem, line: &str) -> Dispatch {
    let mut tokens = line.split_whitespace();
    let Some(cmd) = tokens.next() else {
        return Dispatch::Continue;
    };

    match cmd {
        "exit" => return Dispatch::Exit,
        "ls" => print_result(fs.ls(), |entries| {
            println!("Type\t\tName");
            println!("----\t\t----");
            for (name, kind) in entries {
                let tag = if kind == InodeType::Directory { "DIR" } else { "FILE" };
                println!("<{tag}>\t\t{name}");
            }
        }),
        "df" => print_result(fs.df(), |usage| {
            println!("Filesystem overview");
            println!("----------------------------------------------------------");
            println!("Resource     |         Total |          Used |          Free");
            println!("----------------------------------------------------------");
            println!(
                "Inodes       | {:13} | {:13} | {:13}",
                usage.total_inodes, usage.used_inodes, usage.free_inodes
            );
            println!(
                "Blocks       | {:13} | {:13} | {:13}",
                usage.total_blocks, usage.used_blocks, usage.free_blocks
            );
            println!(
                "Space (KB)   | {:13} | {:13} | {:13}",
                usage.total_kb, usage.used_kb, usage.free_kb
            );
            println!("----------------------------------------------------------");
        }),
        "mkdir" => match_one_arg(&mut tokens, "mkdir <name>", |name| {
            print_result(fs.mkdir(name), |_| println!("Directory '{name}' created."))
        }),
        "rmdir" => match_one_arg(&mut tokens, "rmdir <name>", |name| {
            print_result(fs.rmdir(name), |_| println!("Directory '{name}' removed."))
        }),
        "cd" => match_one_arg(&mut tokens, "cd <name>", |name| {
            print_result(fs.cd(name), |_| {})
        }),
        "rm" => match_one_arg(&mut tokens, "rm <name>", |name| {
            print_result(fs.rm(name), |_| println!("File '{name}' removed."))
        }),
        "delete" => match_one_arg(&mut tokens, "delete <name>", |name| {
            print_result(fs.delete(name), |_| println!("'{name}' deleted."))
        }),
        "stat" => match_one_arg(&mut tokens, "stat <name>", |name| print_stat(fs, name)),
        "cat" => match_one_arg(&mut tokens, "cat <name>", |name| {
            print_result(fs.cat(name), |bytes| {
                println!("{}", String::from_utf8_lossy(&bytes));
            })
        }),
        "import" => match_two_args(&mut tokens, "import <host_path> <dest>", |host, dest| {
            print_result(fs.import(host, dest), |_| {
                println!("Imported '{host}' as '{dest}'.")
            })
        }),
        "rename" => match_two_args(&mut tokens, "rename <old> <new>", |old, new| {
            print_result(fs.rename(old, new), |_| {
                println!("Renamed '{old}' to '{new}'.")
            })
        }),
        "mv" => match_two_args(&mut tokens, "mv <src> <dst_dir>", |src, dst| {
            print_result(fs.mv(src, dst), |_| println!("Moved '{src}' into '{dst}'."))
        }),
        "echo" => dispatch_echo(fs, line),
        "set" => dispatch_set(fs, &mut tokens),
        other => println!("Unknown command: {other}"),
    }
    Dispatch::Continue
}

fn match_one_arg(tokens: &mut std::str::SplitWhitespace, usage: &str, f: impl FnOnce(&str)) {
    match tokens.next() {
        Some(arg) => f(arg),
        None => println!("Usage: {usage}"),
    }
}

fn match_two_args(tokens: &mut std::str::SplitWhitespace, usage: &str, f: impl FnOnce(&str, &str)) {
    match (tokens.next(), tokens.next()) {
        (Some(a), Some(b)) => f(a, b),
        _ => println!("Usage: {usage}"),
    }
}

fn print_result<T>(result: crate::error::Result<T>, on_ok: impl FnOnce(T)) {
    match result {
        Ok(v) => on_ok(v),
        Err(e) => println!("Error: {e}"),
    }
}

fn print_stat(fs: &mut FileSystem, name: &str) {
    match fs.stat(name) {
        Ok(inode) => {
            println!("Stats for: '{name}'");
            println!("----------------------------------");
            println!(
                "  Type..........: {}",
                if inode.is_directory() { "Directory" } else { "File" }
            );
            println!("  Links.........: {}", inode.link_count);
            println!("  Size..........: {} bytes", inode.size);
            println!("  Created.......: {}", inode.created);
            println!("  Accessed......: {}", inode.accessed);
            println!("  Modified......: {}", inode.modified);
            print!("  Data blocks...: [ ");
            for block in inode.direct_blocks.iter().filter(|&&b| b != 0) {
                print!("{block} ");
            }
            println!("]");
        }
        Err(FsError::NotFound(_)) => println!("Error: '{name}' not found."),
        Err(e) => println!("Error: {e}"),
    }
}

/// `echo "<text>" <op> <file>` needs quote-aware parsing: the text between
/// the first pair of double quotes is taken verbatim, whitespace included.
fn dispatch_echo(fs: &mut FileSystem, line: &str) {
    let usage = "Usage: echo \"text\" >|>> <file>";
    let Some(rest) = line.strip_prefix("echo").map(str::trim_start) else {
        return println!("{usage}");
    };
    if !rest.starts_with('"') {
        // No quoted text: behaves like a plain echo to the terminal.
        println!("{rest}");
        return;
    }
    let Some((text, after)) = rest[1..].split_once('"') else {
        return println!("{usage}");
    };
    let mut tail = after.split_whitespace();
    let (Some(op), Some(filename)) = (tail.next(), tail.next()) else {
        return println!("{usage}");
    };
    let Some(mode) = WriteMode::parse(op) else {
        return println!("Invalid redirection operator: {op}");
    };
    print_result(fs.echo(filename, text, mode), |_| {
        println!("Wrote to '{filename}'.")
    });
}

fn dispatch_set(fs: &mut FileSystem, tokens: &mut std::str::SplitWhitespace) {
    match (tokens.next(), tokens.next()) {
        (Some("verbose"), Some("on")) => {
            fs.set_verbose(true);
            println!("Verbose mode enabled.");
        }
        (Some("verbose"), Some("off")) => {
            fs.set_verbose(false);
            println!("Verbose mode disabled.");
        }
        (Some("verbose"), _) => println!("Usage: set verbose <on|off>"),
        (Some(other), _) => println!("Unknown parameter: {other}"),
        (None, _) => println!("Usage: set <parameter> <value>"),
    }
}
