use colored::Colorize;
use tabled::builder::Builder;
use tabled::settings::Style;
use unicache::NamespaceStats;

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_stats(stats: &[NamespaceStats]) {
    if stats.is_empty() {
        println!("No namespaces declared.");
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(["Namespace", "Version", "Key pattern"]);
    for ns in stats {
        let version = ns
            .version
            .map(|v| v.to_string())
            .unwrap_or_else(|| "unavailable".to_string());
        let pattern = ns.key_pattern.as_deref().unwrap_or("-");
        builder.push_record([ns.namespace.as_str(), version.as_str(), pattern]);
    }
    let table = builder.build().with(Style::rounded()).to_string();
    println!("{table}");
}
