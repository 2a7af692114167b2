//! The interactive NanoFS shell: line reading, tokenisation, and dispatch
//! onto `FsApi`. None of this is part of the filesystem core: the shell is
//! a thin driver that owns a `FileBackingStore` and reports errors without
//! ever tearing down the process (`exit` is the only terminator).

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::process::exit;

use nanofs::backing_store::FileBackingStore;
use nanofs::error::Error;
use nanofs::FsApi;

const IMAGE_PATH: &str = "nanofs_disk";
const PROMPT: &str = "nanofs/> ";
const MAX_ARGS: usize = 5;
const MAX_ARG_LEN: usize = 248;

fn main() {
    let verbose = std::env::args().nth(1).as_deref() == Some("verbose");

    let mut fs = mount_or_fresh(verbose);
    run(&mut fs);
}

fn open_image() -> std::fs::File {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(IMAGE_PATH)
        .unwrap_or_else(|e| {
            eprintln!("nanofs: cannot open {IMAGE_PATH}: {e}");
            exit(1);
        })
}

/// Mounts an existing, non-empty image, or starts `Unmounted` (only `init`
/// legal) for a fresh or unparsable one.
fn mount_or_fresh(verbose: bool) -> FsApi<FileBackingStore> {
    let file = open_image();
    let is_empty = file.metadata().map(|m| m.len() == 0).unwrap_or(true);
    if is_empty {
        return FsApi::new(FileBackingStore::new(file), verbose);
    }
    match FsApi::mount(FileBackingStore::new(file), verbose) {
        Ok(fs) => fs,
        Err(_) => FsApi::new(FileBackingStore::new(open_image()), verbose),
    }
}

fn run(fs: &mut FsApi<FileBackingStore>) {
    loop {
        print!("{PROMPT}");
        if io::stdout().flush().is_err() {
            return;
        }

        let mut line = String::new();
        if io::stdin().read_line(&mut line).unwrap_or(0) == 0 {
            return; // EOF
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() > MAX_ARGS {
            eprintln!("nanofs: too many arguments (max {MAX_ARGS})");
            continue;
        }
        if tokens.iter().any(|t| t.len() > MAX_ARG_LEN) {
            eprintln!("nanofs: argument too long (max {MAX_ARG_LEN} bytes)");
            continue;
        }

        match tokens[0] {
            "exit" => return,
            cmd => {
                if let Err(e) = dispatch(fs, cmd, &tokens[1..]) {
                    eprintln!("nanofs: {e}");
                }
            }
        }
    }
}

fn dispatch(fs: &mut FsApi<FileBackingStore>, cmd: &str, args: &[&str]) -> Result<(), Error> {
    match cmd {
        "init" => fs.init(),
        "ls" => {
            for name in fs.ls()? {
                print!("{name} ");
            }
            println!();
            Ok(())
        }
        "cd" => fs.cd(arg(args, 0)?),
        "create" => fs.create(arg(args, 0)?),
        "mkdir" => fs.mkdir(arg(args, 0)?),
        "write" => {
            let path = arg(args, 0)?;
            let text = args.get(1).copied().unwrap_or("");
            fs.write_file(path, text.as_bytes())
        }
        "read" => {
            let bytes = fs.read_file(arg(args, 0)?)?;
            println!("{}", String::from_utf8_lossy(&bytes));
            Ok(())
        }
        "rm" => fs.rm(arg(args, 0)?),
        "open" => fs.open(arg(args, 0)?, Path::new(arg(args, 1)?)),
        "save" => fs.save(Path::new(arg(args, 0)?), arg(args, 1)?),
        other => {
            eprintln!("nanofs: unknown command '{other}'");
            Ok(())
        }
    }
}

fn arg<'a>(args: &[&'a str], i: usize) -> Result<&'a str, Error> {
    args.get(i).copied().ok_or(Error::InvalidPath)
}
