use slnview_core::tree::{TreeItem, TreeItemKind};

use crate::client::Expanded;

fn marker(item: &TreeItem) -> &'static str {
    match item.kind {
        TreeItemKind::SolutionRoot => "[sln] ",
        TreeItemKind::SolutionFolder => "[dir] ",
        TreeItemKind::Project => "[proj] ",
        TreeItemKind::ProjectFolder => "",
        TreeItemKind::ProjectFile => "",
        TreeItemKind::NoSolution => "! ",
    }
}

/// Draws the expanded tree with box-drawing guides. Project folders get a
/// trailing `/`.
pub fn render_tree(roots: &[Expanded]) -> String {
    let mut out = String::new();
    for root in roots {
        out.push_str(marker(&root.item));
        out.push_str(&root.item.label);
        out.push('\n');
        render_children(&root.children, "", &mut out);
    }
    out
}

fn render_children(children: &[Expanded], prefix: &str, out: &mut String) {
    for (i, child) in children.iter().enumerate() {
        let last = i + 1 == children.len();
        out.push_str(prefix);
        out.push_str(if last { "└── " } else { "├── " });
        out.push_str(marker(&child.item));
        out.push_str(&child.item.label);
        if child.item.kind == TreeItemKind::ProjectFolder {
            out.push('/');
        }
        out.push('\n');

        let nested = format!("{prefix}{}", if last { "    " } else { "│   " });
        render_children(&child.children, &nested, out);
    }
}
