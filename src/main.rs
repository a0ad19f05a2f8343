//! `exfs2` — create, inspect, and manipulate an ExFS2 volume rooted at the
//! current working directory.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::process::exit;

use exfs2::Filesystem;

/// Writes an error to stderr, then exits with status 1.
fn error<M: fmt::Display>(prog: &str, msg: M) -> ! {
    eprintln!("{prog}: error: {msg}");
    exit(1);
}

/// The command requested on the command line, plus the arguments it needs.
enum Command {
    List,
    Add { fs_path: String, host_file: PathBuf },
    Remove { fs_path: String },
    Extract { fs_path: String },
    Debug { fs_path: String },
}

/// Structure storing command line arguments.
#[derive(Default)]
struct Args {
    /// The name of the current program used in command line.
    prog: String,

    list: bool,
    add_path: Option<String>,
    host_file: Option<PathBuf>,
    remove_path: Option<String>,
    extract_path: Option<String>,
    debug_path: Option<String>,
}

impl Args {
    /// Resolves the parsed flags into a single [`Command`], or `None` if
    /// the combination given is not a valid command.
    fn into_command(self) -> Option<Command> {
        if self.list {
            return Some(Command::List);
        }
        if let Some(fs_path) = self.add_path {
            return Some(Command::Add {
                fs_path,
                host_file: self.host_file?,
            });
        }
        if let Some(fs_path) = self.remove_path {
            return Some(Command::Remove { fs_path });
        }
        if let Some(fs_path) = self.extract_path {
            return Some(Command::Extract { fs_path });
        }
        if let Some(fs_path) = self.debug_path {
            return Some(Command::Debug { fs_path });
        }
        None
    }
}

fn parse_args() -> Args {
    let mut args: Args = Default::default();
    let mut iter = env::args();
    args.prog = iter.next().unwrap_or("exfs2".to_owned());

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-l" => args.list = true,
            "-a" => args.add_path = iter.next(),
            "-f" => args.host_file = iter.next().map(PathBuf::from),
            "-r" => args.remove_path = iter.next(),
            "-e" => args.extract_path = iter.next(),
            "-D" => args.debug_path = iter.next(),
            _ => {
                print_usage(&args.prog);
                exit(1);
            }
        }
    }

    args
}

/// Prints command usage to standard output, per the CLI contract: an
/// unrecognized invocation is a usage diagnostic, not an error diagnostic.
fn print_usage(prog: &str) {
    println!("usage: {prog} -l");
    println!("       {prog} -a <fs_path> -f <host_file>");
    println!("       {prog} -r <fs_path>");
    println!("       {prog} -e <fs_path>");
    println!("       {prog} -D <fs_path>");
}

fn main() {
    let args = parse_args();
    let prog = args.prog.clone();

    let command = match args.into_command() {
        Some(cmd) => cmd,
        None => {
            print_usage(&prog);
            exit(1);
        }
    };

    let cwd = env::current_dir().unwrap_or_else(|e| error(&prog, e));
    let fs = Filesystem::open_or_init(&cwd).unwrap_or_else(|e| error(&prog, e));

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let result = match command {
        Command::List => fs.list(&mut out),
        Command::Add { fs_path, host_file } => fs.add(&fs_path, &host_file),
        Command::Remove { fs_path } => fs.remove(&fs_path),
        Command::Extract { fs_path } => fs.extract(&fs_path, &mut out),
        Command::Debug { fs_path } => fs.debug(&fs_path, &mut out),
    };

    if let Err(e) = result {
        error(&prog, e);
    }
}
