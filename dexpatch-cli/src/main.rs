use clap::{Parser, Subcommand};
use dexpatch_isa::AsmItem;
use dexpatch_patcher::{
    Fingerprint, Manifest, OptionValues, PatchSession, Scanner, Scope, Uniqueness,
};
use dexpatch_pool::MethodPool;
use std::fmt::Display;
use std::path::{Path, PathBuf};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[cfg(target_env = "msvc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "dexpatch", about = "Fingerprint-driven Dalvik method patcher")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every method of a pool with its body
    Disasm {
        /// Path to the pool YAML
        pool: PathBuf,
    },
    /// Resolve the fingerprints a manifest declares, without patching
    Scan {
        /// Path to the pool YAML
        pool: PathBuf,
        /// Path to the patch manifest
        manifest: PathBuf,
    },
    /// Print the order patches would execute in
    Order {
        /// Path to the patch manifest
        manifest: PathBuf,
        /// Patches to run (default: all)
        patches: Vec<String>,
    },
    /// Apply a manifest's patches and write the patched pool
    Patch {
        /// Path to the pool YAML
        pool: PathBuf,
        /// Path to the patch manifest
        manifest: PathBuf,
        /// Output pool (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Extra option values, overriding the manifest's
        #[arg(long)]
        options: Option<PathBuf>,
        /// Patches to run (default: all)
        #[arg(short, long = "patch")]
        patches: Vec<String>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Disasm { pool } => cmd_disasm(&pool),
        Commands::Scan { pool, manifest } => cmd_scan(&pool, &manifest),
        Commands::Order { manifest, patches } => cmd_order(&manifest, &patches),
        Commands::Patch {
            pool,
            manifest,
            output,
            options,
            patches,
        } => cmd_patch(&pool, &manifest, output.as_deref(), options.as_deref(), &patches),
    }
}

fn or_exit<T, E: Display>(result: Result<T, E>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_disasm(path: &Path) {
    let pool = or_exit(MethodPool::open(path));

    println!("# {} classes, {} methods", pool.class_count(), pool.method_count());
    for class in pool.classes() {
        println!();
        println!(".class {} {}", class.access_flags().names().join(" "), class.descriptor());
        if let Some(s) = class.super_class() {
            println!(".super {s}");
        }
        for method in class.methods() {
            println!();
            println!(
                ".method {} {}({}){}",
                method.access_flags().names().join(" "),
                method.name(),
                method.parameters().concat(),
                method.return_type()
            );
            println!("    .registers {}", method.registers());
            let mut index = 0;
            for item in method.body().to_items() {
                match item {
                    AsmItem::Label(label) => println!("  {label}"),
                    AsmItem::Instruction(insn) => {
                        println!("    {insn}    # {index}");
                        index += 1;
                    }
                }
            }
            println!(".end method");
        }
    }
}

fn cmd_scan(pool: &Path, manifest: &Path) {
    let pool = or_exit(MethodPool::open(pool));
    let manifest = or_exit(Manifest::open(manifest));

    let mut scanner = Scanner::new();
    let mut failed = false;
    for patch in &manifest.patches {
        for entry in &patch.fingerprints {
            let fingerprint = or_exit(Fingerprint::try_from(&entry.def));
            let uniqueness = if entry.unique {
                Uniqueness::Required
            } else {
                Uniqueness::First
            };
            match scanner.resolve(&pool, &fingerprint, &Scope::Pool, uniqueness) {
                Ok(r) => println!("{}/{}: {} {:?}", patch.name, fingerprint.name(), r.signature, r.pattern()),
                Err(e) if entry.optional => println!("{}/{}: absent ({e})", patch.name, fingerprint.name()),
                Err(e) => {
                    println!("{}/{}: {e}", patch.name, fingerprint.name());
                    failed = true;
                }
            }
        }
    }
    log::info!("{} scans", scanner.scans());
    if failed {
        std::process::exit(1);
    }
}

fn cmd_order(manifest: &Path, patches: &[String]) {
    let manifest = or_exit(Manifest::open(manifest));
    let mut session = PatchSession::new(MethodPool::new(), or_exit(manifest.app_context()));
    for patch in or_exit(manifest.into_descriptors()) {
        or_exit(session.register(patch));
    }
    let order = if patches.is_empty() {
        let all: Vec<String> = session.patches().iter().map(|p| p.name().to_string()).collect();
        or_exit(session.order(&all.iter().map(String::as_str).collect::<Vec<_>>()))
    } else {
        or_exit(session.order(&patches.iter().map(String::as_str).collect::<Vec<_>>()))
    };
    for (i, name) in order.iter().enumerate() {
        println!("{:>3}. {name}", i + 1);
    }
}

fn cmd_patch(
    pool: &Path,
    manifest: &Path,
    output: Option<&Path>,
    options: Option<&Path>,
    patches: &[String],
) {
    let pool = or_exit(MethodPool::open(pool));
    let manifest = or_exit(Manifest::open(manifest));

    let mut session = PatchSession::new(pool, or_exit(manifest.app_context()));
    session.set_options(manifest.options.clone());
    if let Some(path) = options {
        let text = or_exit(std::fs::read_to_string(path));
        session.set_options(or_exit(OptionValues::from_yaml(&text)));
    }
    for patch in or_exit(manifest.into_descriptors()) {
        or_exit(session.register(patch));
    }

    let report = if patches.is_empty() {
        or_exit(session.run_all())
    } else {
        or_exit(session.run(&patches.iter().map(String::as_str).collect::<Vec<_>>()))
    };
    eprintln!("Applied {} patches: {}", report.executed.len(), report.executed.join(", "));

    let pool = session.into_pool();
    match output {
        Some(path) => or_exit(pool.save(path)),
        None => print!("{}", or_exit(pool.to_yaml())),
    }
}
