use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracetree_config::Config;

use crate::layout::{NodeKey, TraceItem, TraceTree};
use crate::settings::MemorySettings;
use crate::trace::Trace;
use crate::utils::{default_session_path, expand_home};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(subcommand_value_name = "SUBCOMMAND")]
#[command(subcommand_help_heading = "Subcommands")]
pub struct Cli {
    /// Path to config file (default: `$XDG_CONFIG_HOME/tracetree/config.kdl`).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// Path to the saved session, overriding the one from the config.
    #[arg(short, long, global = true)]
    pub session: Option<PathBuf>,

    #[command(subcommand)]
    pub subcommand: Sub,
}

#[derive(Subcommand)]
pub enum Sub {
    /// Print the trace tree with the saved grouping applied.
    Show {
        /// Print the tree as JSON.
        #[arg(short, long)]
        json: bool,
    },
    /// Move traces into a new group at the bottom of the view.
    Group {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Dissolve all groups, keeping the traces in order.
    Ungroup,
    /// Forget the saved session.
    Reset,
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(path),
        None => Config::load_default(),
    }
    .map_err(|err| anyhow::anyhow!("{err:?}"))?;

    let session_path = session_path(cli.session.as_deref(), &config)?;

    match cli.subcommand {
        Sub::Show { json } => {
            let tree = load_view(&config, &session_path)?;
            if json {
                let json = serde_json::to_string_pretty(&tree.layout_tree())
                    .context("error serializing layout tree")?;
                println!("{json}");
            } else {
                print!("{}", tree.debug_tree());
            }
        }
        Sub::Group { names } => {
            let mut tree = load_view(&config, &session_path)?;
            group_traces(&mut tree, &names)?;
            save_session(&tree, &session_path)?;
            print!("{}", tree.debug_tree());
        }
        Sub::Ungroup => {
            let mut tree = load_view(&config, &session_path)?;
            ungroup_all(&mut tree);
            save_session(&tree, &session_path)?;
            print!("{}", tree.debug_tree());
        }
        Sub::Reset => {
            if session_path.exists() {
                std::fs::remove_file(&session_path)
                    .with_context(|| format!("error removing {session_path:?}"))?;
                info!("removed {session_path:?}");
            }
        }
    }

    Ok(())
}

fn session_path(cli_path: Option<&Path>, config: &Config) -> anyhow::Result<PathBuf> {
    let path = match (cli_path, &config.session_file) {
        (Some(path), _) => path.to_owned(),
        (None, Some(path)) => PathBuf::from(path),
        (None, None) => {
            return default_session_path().context("no location available for the session file")
        }
    };
    Ok(expand_home(&path)?.unwrap_or(path))
}

/// Registers the configured traces with a new tree. All traces start out detached.
pub fn build_tree(config: &Config) -> TraceTree<Trace> {
    let mut tree = TraceTree::new();
    for decl in &config.traces {
        tree.insert_item(Trace::from_decl(decl, config.default_height));
    }
    tree
}

/// Builds the view for `config`, applying the session saved at `session_path` if there is one.
///
/// Traces the session doesn't mention are appended at the bottom of the view.
pub fn load_view(config: &Config, session_path: &Path) -> anyhow::Result<TraceTree<Trace>> {
    let mut tree = build_tree(config);
    let root = tree.root();

    if session_path.exists() {
        let mut settings = MemorySettings::load(session_path)?;
        let items = tree.items_by_name();
        tree.restore_tree(root, &mut settings, &items);
    } else {
        debug!("no session at {session_path:?}");
    }

    for key in tree.unplaced_items() {
        append_to_view(&mut tree, key);
    }
    tree.restack_all();
    tree.restack_pending();

    Ok(tree)
}

pub fn save_session(tree: &TraceTree<Trace>, session_path: &Path) -> anyhow::Result<()> {
    let mut settings = MemorySettings::new();
    tree.save_tree(tree.root(), &mut settings);
    settings.save(session_path)
}

/// Adds a detached node to the view so that restacking keeps it below the current children.
pub fn append_to_view(tree: &mut TraceTree<Trace>, key: NodeKey) {
    let root = tree.root();
    let (_, bottom) = tree.owner_v_extents(root);
    let (top, _) = tree.v_extents(key);
    tree.set_layout_v_offset(key, bottom - top);
    tree.add_child_item(root, key);
}

/// Moves the named traces, in the given order, into a new group at the bottom of the view.
pub fn group_traces(tree: &mut TraceTree<Trace>, names: &[String]) -> anyhow::Result<NodeKey> {
    let by_name = tree.items_by_name();
    let mut keys = Vec::with_capacity(names.len());
    for name in names {
        let Some(&key) = by_name.get(name) else {
            bail!("no trace named {name:?}");
        };
        if keys.contains(&key) {
            bail!("trace {name:?} is listed twice");
        }
        keys.push(key);
    }

    let group = tree.new_group();
    for (idx, &key) in keys.iter().enumerate() {
        if let Some(owner) = tree.owner(key) {
            tree.remove_child_item(owner, key);
        }
        // Keep the listed order once the group is restacked.
        tree.set_layout_v_offset(key, idx as i32);
        tree.add_child_item(group, key);
    }
    tree.restack_items(group);

    let pruned = tree.prune_empty_groups();
    if pruned > 0 {
        debug!("pruned {pruned} empty groups");
    }

    append_to_view(tree, group);
    tree.restack_all();
    tree.restack_pending();

    let names: Vec<_> = keys
        .iter()
        .filter_map(|key| tree.item(*key))
        .map(|trace| trace.name())
        .collect();
    info!("grouped {names:?}");
    Ok(group)
}

/// Dissolves every group, putting the traces back into the view in their current order.
pub fn ungroup_all(tree: &mut TraceTree<Trace>) {
    let root = tree.root();
    let leaves: Vec<(NodeKey, i32)> = tree
        .leaf_items(root)
        .into_iter()
        .map(|key| (key, tree.absolute_v_offset(key)))
        .collect();

    tree.dissolve_groups();
    for (key, offset) in leaves {
        tree.set_layout_v_offset(key, offset);
        tree.add_child_item(root, key);
    }
    for key in tree.unplaced_items() {
        append_to_view(tree, key);
    }
    tree.restack_all();
    tree.restack_pending();
}
