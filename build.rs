use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use toml::Table;

/// A board setting: TOML section, key, generated constant, type and default.
struct Setting {
    section: &'static str,
    key: &'static str,
    name: &'static str,
    ty: &'static str,
    default: i64,
}

const SETTINGS: &[Setting] = &[
    Setting { section: "board", key: "harts", name: "HART_COUNT", ty: "usize", default: 5 },
    Setting { section: "board", key: "monitor", name: "MONITOR_HART", ty: "u8", default: 0 },
    Setting { section: "ipi", key: "mailbox_capacity", name: "MAILBOX_CAPACITY", ty: "usize", default: 16 },
    Setting { section: "ipi", key: "payload_bytes", name: "PAYLOAD_CAPACITY", ty: "usize", default: 32 },
    Setting { section: "ipi", key: "transactions", name: "TRANSACTION_SLOTS", ty: "usize", default: 16 },
    Setting { section: "engine", key: "max_machines", name: "MAX_MACHINES", ty: "usize", default: 8 },
    Setting { section: "boot", key: "ready_timeout_ticks", name: "READY_TIMEOUT_TICKS", ty: "u32", default: 200_000 },
    Setting { section: "boot", key: "release_attempts", name: "RELEASE_ATTEMPTS", ty: "u8", default: 1 },
];

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=config.toml");
    println!("cargo:rerun-if-changed=linkers");

    let out_dir = env::var("OUT_DIR").unwrap();
    let out_path = Path::new(&out_dir);
    let target = env::var("TARGET").unwrap();

    println!("cargo:rustc-env=TARGET={}", target);

    // Config parsing
    let config_str = fs::read_to_string("config.toml").unwrap_or_default();
    let root: Table = if !config_str.is_empty() {
        toml::from_str(&config_str).unwrap_or_else(|e| {
            println!("cargo:warning=Failed to parse config.toml: {}", e);
            Table::new()
        })
    } else {
        println!("cargo:warning=config.toml not found, using default board settings");
        Table::new()
    };

    let mut generated = String::new();
    for setting in SETTINGS {
        let value = root
            .get(setting.section)
            .and_then(|v| v.as_table())
            .and_then(|t| t.get(setting.key))
            .and_then(|v| v.as_integer())
            .unwrap_or(setting.default);
        if value < 0 {
            panic!("{}.{} must not be negative", setting.section, setting.key);
        }
        writeln!(generated, "/// `{}.{}` from config.toml.", setting.section, setting.key).unwrap();
        writeln!(generated, "pub const {}: {} = {};", setting.name, setting.ty, value).unwrap();
    }

    let harts = root
        .get("board")
        .and_then(|v| v.as_table())
        .and_then(|t| t.get("harts"))
        .and_then(|v| v.as_integer())
        .unwrap_or(5);
    if !(1..=32).contains(&harts) {
        panic!("board.harts must be between 1 and 32, got {}", harts);
    }

    let halt = match root
        .get("boot")
        .and_then(|v| v.as_table())
        .and_then(|t| t.get("on_timeout"))
        .and_then(|v| v.as_str())
    {
        None | Some("continue") => false,
        Some("halt") => true,
        Some(other) => panic!("boot.on_timeout must be \"continue\" or \"halt\", got {:?}", other),
    };
    writeln!(generated, "/// `boot.on_timeout` from config.toml.").unwrap();
    writeln!(generated, "pub const HALT_ON_BOOT_FAILURE: bool = {};", halt).unwrap();

    let level = root
        .get("log")
        .and_then(|v| v.as_table())
        .and_then(|t| t.get("level"))
        .and_then(|v| v.as_str())
        .unwrap_or("info");
    let level = match level {
        "off" => "Off",
        "error" => "Error",
        "warn" => "Warn",
        "info" => "Info",
        "debug" => "Debug",
        "trace" => "Trace",
        other => panic!("log.level {:?} is not a log level", other),
    };
    writeln!(generated, "/// `log.level` from config.toml.").unwrap();
    writeln!(generated, "pub const LOG_LEVEL: log::LevelFilter = log::LevelFilter::{};", level).unwrap();

    fs::write(out_path.join("config.rs"), generated).unwrap();

    // Linker selection, bare-metal RISC-V only
    if target.starts_with("riscv64") && target.ends_with("-none-elf") {
        let linker_script = "riscv64.ld";
        let linker_path = Path::new("linkers").join(linker_script);

        if !linker_path.exists() {
            panic!("Linker script not found: {}", linker_path.display());
        }

        let dest_path = out_path.join(linker_script);
        fs::copy(&linker_path, &dest_path).unwrap();

        println!("cargo:rustc-link-search={}", out_dir);
        println!("cargo:rustc-link-arg-bins=-T{}", linker_script);
    }
}
