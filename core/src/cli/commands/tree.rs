use super::{lock_suffix, print_json};
use crate::cli::OutputFormat;
use crate::manager::LockManager;
use crate::tree::{FileTree, NodeId, TreeMode, TreeNode};
use colored::Colorize;

pub fn run(
    manager: &LockManager,
    mode: TreeMode,
    owner: &str,
    filter: &str,
    depth: Option<usize>,
    format: OutputFormat,
) -> Result<(), String> {
    let tree_filter = manager.tree_filter(filter, owner);
    let mut tree = manager.build_tree(mode, &tree_filter)?;
    if let Some(depth) = depth {
        tree.enforce_expansion_depth(depth);
    }

    if format == OutputFormat::Json {
        print_json(&tree);
        return Ok(());
    }

    let leaves = tree.leaves().count();
    if leaves == 0 {
        match mode {
            TreeMode::Lock => println!("No files available to lock"),
            TreeMode::Unlock => println!("No locks"),
        }
        return Ok(());
    }

    for &root in tree.roots() {
        print_node(&tree, root, 0);
    }
    println!();
    println!("Total: {leaves} file(s)");

    Ok(())
}

fn print_node(tree: &FileTree, id: NodeId, indent: usize) {
    let item = tree.item(id);
    if item.hidden {
        return;
    }
    let pad = "  ".repeat(indent);
    match &item.node {
        TreeNode::Directory { name, .. } => {
            let visible: Vec<NodeId> = item
                .children
                .iter()
                .copied()
                .filter(|&child| !tree.item(child).hidden)
                .collect();
            if item.expanded {
                println!("{pad}{}/", name.blue().bold());
                for child in visible {
                    print_node(tree, child, indent + 1);
                }
            } else {
                let collapsed = format!("(+{})", visible.len());
                println!("{pad}{}/ {}", name.blue().bold(), collapsed.dimmed());
            }
        }
        TreeNode::File { name, lock, .. } => match lock {
            Some(lock) => println!("{pad}{name}  {}", lock_suffix(lock)),
            None => println!("{pad}{name}"),
        },
    }
}
