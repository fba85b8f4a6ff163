use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use refit_core::tree::{layout::layout_in_place, Node};
use refit_core::types::{ClassHierarchy, TypeRef};
use refit_core::{
    init_tracing, AnnotationSuppression, CallSiteRewriter, FixComposer, IdentityConversion, Match,
    RefitConfig, RuleSetBuilder, RuleStore, Scanner, TemplateCompiler,
};
use serde::Deserialize;
use tracing::info;

/// A class the type oracle should know about beyond `java.lang`
#[derive(Debug, Deserialize)]
struct ClassEntry {
    name: String,
    #[serde(default)]
    params: Vec<String>,
    #[serde(default)]
    supers: Vec<TypeRef>,
}

fn main() -> Result<()> {
    // Initialize logging
    init_tracing();

    let tree_args = [
        Arg::new("tree")
            .value_name("TREE")
            .help("Resolved syntax tree as JSON")
            .required(true)
            .index(1),
        Arg::new("source")
            .long("source")
            .value_name("FILE")
            .help("Source text the tree's spans point into; the tree is printed afresh when omitted"),
        Arg::new("classes")
            .long("classes")
            .value_name("FILE")
            .help("JSON list of {name, params, supers} class declarations for the type oracle"),
        Arg::new("apply")
            .long("apply")
            .help("Print the rewritten text instead of the matches")
            .action(ArgAction::SetTrue),
    ];

    let matches = Command::new("refit")
        .version(refit_core::VERSION)
        .about("Compile, scan and migrate with pattern-based rewrite rules")
        .subcommand_required(true)
        .arg(
            Arg::new("rules")
                .long("rules")
                .value_name("DIR")
                .help("Compiled rule directory")
                .global(true)
                .default_value("./refit-rules"),
        )
        .arg(
            Arg::new("attempts")
                .long("attempts")
                .value_name("N")
                .help("Read attempts per rule blob")
                .global(true)
                .value_parser(clap::value_parser!(usize))
                .default_value("3"),
        )
        .arg(
            Arg::new("allow-comments")
                .long("allow-comments")
                .help("Compile rules that also match code containing comments")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("compile")
                .about("Compile rule declarations into the rule directory")
                .arg(
                    Arg::new("units")
                        .value_name("UNIT")
                        .help("Rule declaration trees as JSON")
                        .required(true)
                        .num_args(1..),
                ),
        )
        .subcommand(Command::new("list").about("List the compiled rules"))
        .subcommand(
            Command::new("scan")
                .about("Scan a tree with every compiled rule")
                .args(tree_args.clone())
                .arg(
                    Arg::new("identity")
                        .long("identity")
                        .help("Also run the built-in identity conversion check")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("migrate")
                .about("Rewrite stubbing call sites with the compiled migration pairs")
                .args(tree_args),
        )
        .get_matches();

    let config = config_from(&matches)?;
    match matches.subcommand() {
        Some(("compile", sub)) => compile(&config, sub),
        Some(("list", _)) => list(&config),
        Some(("scan", sub)) => scan(&config, sub),
        Some(("migrate", sub)) => migrate(&config, sub),
        _ => Ok(()),
    }
}

fn config_from(matches: &ArgMatches) -> Result<RefitConfig> {
    let rule_dir = matches.get_one::<String>("rules").context("missing rule directory")?;
    Ok(RefitConfig {
        rule_dir: PathBuf::from(rule_dir),
        max_read_attempts: matches.get_one::<usize>("attempts").copied().unwrap_or(3),
        reject_comments: !matches.get_flag("allow-comments"),
        ..Default::default()
    })
}

fn read_tree(path: &str) -> Result<Node> {
    let json = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    serde_json::from_str(&json).with_context(|| format!("parsing tree {path}"))
}

fn compile(config: &RefitConfig, matches: &ArgMatches) -> Result<()> {
    let compiler = TemplateCompiler::from_config(config);
    let mut builder = RuleSetBuilder::new();
    for unit in matches.get_many::<String>("units").into_iter().flatten() {
        builder.compile_unit(&compiler, &read_tree(unit)?)?;
    }
    let set = builder.build();
    let written = set.persist(&config.rule_dir, config)?;
    info!(written, dir = %config.rule_dir.display(), "compiled rules");
    for name in set.names() {
        println!("{name}");
    }
    Ok(())
}

fn list(config: &RefitConfig) -> Result<()> {
    let set = RuleStore::open(config).rules()?;
    for rule in set.rules() {
        let kind = if rule.is_flag_only() { "flag" } else { "rule" };
        println!("{kind}\t{}\t{} before, {} after", rule.name, rule.before.len(), rule.after.len());
    }
    for pair in set.migrations() {
        println!("migration\t{}\t{} -> {}", pair.name, pair.type_from, pair.type_to);
    }
    Ok(())
}

/// The tree with spans into its source text, and the type oracle
fn load_input(matches: &ArgMatches) -> Result<(Node, String, ClassHierarchy)> {
    let path = matches.get_one::<String>("tree").context("missing tree")?;
    let mut tree = read_tree(path)?;
    let source = match matches.get_one::<String>("source") {
        Some(source) => fs::read_to_string(source).with_context(|| format!("reading {source}"))?,
        None => layout_in_place(&mut tree),
    };

    let mut oracle = ClassHierarchy::java_lang();
    if let Some(classes) = matches.get_one::<String>("classes") {
        let json = fs::read_to_string(classes).with_context(|| format!("reading {classes}"))?;
        let entries: Vec<ClassEntry> =
            serde_json::from_str(&json).with_context(|| format!("parsing {classes}"))?;
        for entry in entries {
            let params: Vec<&str> = entry.params.iter().map(String::as_str).collect();
            oracle = oracle.declare(&entry.name, &params, entry.supers);
        }
    }
    Ok((tree, source, oracle))
}

fn report(matches: &ArgMatches, found: &[Match], source: &str) -> Result<()> {
    if matches.get_flag("apply") {
        let script = FixComposer::compose(found, source)?;
        for import in script.imports() {
            println!("import {import};");
        }
        print!("{}", script.apply(source));
    } else {
        println!("{}", serde_json::to_string_pretty(found)?);
    }
    Ok(())
}

fn scan(config: &RefitConfig, matches: &ArgMatches) -> Result<()> {
    let set = RuleStore::open(config).rules()?;
    let (tree, source, oracle) = load_input(matches)?;

    let suppression = AnnotationSuppression;
    let mut scanner = Scanner::new(set.rules(), &oracle, &source).with_suppression(&suppression);
    let mut found = scanner.scan_collect(&tree)?;
    if matches.get_flag("identity") {
        found.extend(IdentityConversion::new(&oracle, &source).check(&tree));
    }
    for (rule, counters) in scanner.stats().iter() {
        info!(
            rule,
            attempts = counters.attempts,
            matches = counters.matches,
            comment_rejections = counters.comment_rejections,
            suppressions = counters.suppressions,
            "rule stats"
        );
    }
    report(matches, &found, &source)
}

fn migrate(config: &RefitConfig, matches: &ArgMatches) -> Result<()> {
    let set = RuleStore::open(config).rules()?;
    let (tree, source, oracle) = load_input(matches)?;

    let found = CallSiteRewriter::new(set.migrations(), &oracle, &source)
        .with_conventions(config.stubbing.clone())
        .rewrite_unit(&tree)?;
    info!(call_sites = found.len(), "migrated call sites");
    report(matches, &found, &source)
}
