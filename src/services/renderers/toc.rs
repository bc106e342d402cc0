//! Table-of-contents construction shared by the PDF renderer: builds a tree
//! from each slide's `title_level`, then flattens it either into textual
//! outline lines or into a `lopdf` bookmark tree.

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::types::Slide;

#[derive(Debug, Clone, PartialEq)]
pub struct OutlineNode {
    pub title: String,
    pub title_level: u32,
    pub page_no: u32,
    pub hidden: bool,
    pub children: Vec<OutlineNode>,
}

/// Builds the TOC tree from titled slides in page order. A slide descends
/// under the previous sibling if that sibling's level is shallower;
/// otherwise it joins at the current level. `hideInToc` slides are kept in
/// the tree (so deeper titles can still nest under them) but flagged.
pub fn build_outline_tree(slides: &[Slide], page_of: impl Fn(u32) -> u32) -> Vec<OutlineNode> {
    let mut roots: Vec<OutlineNode> = Vec::new();
    // One stack entry per currently-open ancestor chain, holding a path of
    // indices into `roots`/children vectors down to the current insertion point.
    let mut stack: Vec<(u32, Vec<usize>)> = Vec::new();

    for slide in slides {
        let Some(title) = &slide.title else { continue };
        let node = OutlineNode {
            title: title.clone(),
            title_level: slide.title_level,
            page_no: page_of(slide.index),
            hidden: slide.frontmatter.hide_in_toc,
            children: Vec::new(),
        };

        while let Some((level, _)) = stack.last() {
            if *level < slide.title_level {
                break;
            }
            stack.pop();
        }

        let path = match stack.last() {
            Some((_, parent_path)) => {
                let parent = node_at_mut(&mut roots, parent_path);
                parent.children.push(node);
                let mut path = parent_path.clone();
                path.push(parent.children.len() - 1);
                path
            }
            None => {
                roots.push(node);
                vec![roots.len() - 1]
            }
        };

        stack.push((slide.title_level, path));
    }

    roots
}

fn node_at_mut<'a>(roots: &'a mut [OutlineNode], path: &[usize]) -> &'a mut OutlineNode {
    let mut node = &mut roots[path[0]];
    for &idx in &path[1..] {
        node = &mut node.children[idx];
    }
    node
}

/// Renders `"<1-based-page>|<dashes>|<title>"` lines, one per titled slide,
/// in depth-first (document) order. `hideInToc` slides still produce a line
/// — they are flagged in the tree, not removed from it.
pub fn render_outline_lines(nodes: &[OutlineNode]) -> Vec<String> {
    let mut lines = Vec::new();
    fn walk(nodes: &[OutlineNode], lines: &mut Vec<String>) {
        for node in nodes {
            let dashes = "-".repeat((node.title_level.saturating_sub(1)) as usize);
            lines.push(format!("{}|{}|{}", node.page_no, dashes, node.title));
            walk(&node.children, lines);
        }
    }
    walk(nodes, &mut lines);
    lines
}

/// Installs a `lopdf` bookmark tree rooted at the document catalog's
/// `/Outlines` entry, wiring `/First`, `/Last`, `/Parent`, `/Next`, `/Prev`,
/// and `/Count` per the PDF outline spec.
pub fn write_lopdf_outline(doc: &mut Document, pages: &std::collections::BTreeMap<u32, ObjectId>, nodes: &[OutlineNode]) {
    if nodes.is_empty() {
        return;
    }

    let outlines_id = doc.new_object_id();
    let (first, last, count) = write_siblings(doc, pages, nodes, outlines_id);

    let mut outlines_dict = Dictionary::new();
    outlines_dict.set("Type", "Outlines");
    outlines_dict.set("First", Object::Reference(first));
    outlines_dict.set("Last", Object::Reference(last));
    outlines_dict.set("Count", count as i64);
    doc.objects.insert(outlines_id, Object::Dictionary(outlines_dict));

    if let Ok(root_id) = doc.trailer.get(b"Root").and_then(Object::as_reference) {
        if let Ok(catalog) = doc.get_object_mut(root_id).and_then(Object::as_dict_mut) {
            catalog.set("Outlines", Object::Reference(outlines_id));
        }
    }
}

/// Writes one sibling chain, returning `(first_id, last_id, total_descendant_count)`.
fn write_siblings(
    doc: &mut Document,
    pages: &std::collections::BTreeMap<u32, ObjectId>,
    nodes: &[OutlineNode],
    parent: ObjectId,
) -> (ObjectId, ObjectId, usize) {
    let ids: Vec<ObjectId> = nodes.iter().map(|_| doc.new_object_id()).collect();
    let mut total = 0;

    for (i, node) in nodes.iter().enumerate() {
        let mut dict = Dictionary::new();
        dict.set("Title", Object::string_literal(node.title.clone()));
        dict.set("Parent", Object::Reference(parent));
        if i > 0 {
            dict.set("Prev", Object::Reference(ids[i - 1]));
        }
        if i + 1 < ids.len() {
            dict.set("Next", Object::Reference(ids[i + 1]));
        }
        if let Some(&page_id) = pages.get(&node.page_no) {
            dict.set("Dest", Object::Array(vec![Object::Reference(page_id), "Fit".into()]));
        }

        if !node.children.is_empty() {
            let (first, last, child_count) = write_siblings(doc, pages, &node.children, ids[i]);
            dict.set("First", Object::Reference(first));
            dict.set("Last", Object::Reference(last));
            dict.set("Count", child_count as i64);
            total += child_count;
        }

        doc.objects.insert(ids[i], Object::Dictionary(dict));
        total += 1;
    }

    (ids[0], ids[ids.len() - 1], total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::slide::Frontmatter;

    fn slide(index: u32, title: Option<&str>, level: u32, hidden: bool) -> Slide {
        Slide {
            index,
            title: title.map(str::to_string),
            note: None,
            frontmatter: Frontmatter { hide_in_toc: hidden, ..Default::default() },
            title_level: level,
            clicks_total: 0,
        }
    }

    #[test]
    fn flat_titles_become_siblings() {
        let slides = vec![slide(1, Some("A"), 1, false), slide(2, Some("B"), 1, false)];
        let tree = build_outline_tree(&slides, |no| no);
        assert_eq!(tree.len(), 2);
        assert!(tree[0].children.is_empty());
    }

    #[test]
    fn deeper_level_nests_under_previous_sibling() {
        let slides = vec![
            slide(1, Some("Chapter 1"), 1, false),
            slide(2, Some("Section 1.1"), 2, false),
            slide(3, Some("Chapter 2"), 1, false),
        ];
        let tree = build_outline_tree(&slides, |no| no);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].title, "Section 1.1");
        assert!(tree[1].children.is_empty());
    }

    #[test]
    fn hidden_slides_stay_in_tree_but_are_flagged() {
        let slides = vec![slide(1, Some("Hidden"), 1, true)];
        let tree = build_outline_tree(&slides, |no| no);
        assert_eq!(tree.len(), 1);
        assert!(tree[0].hidden);
    }

    #[test]
    fn render_lines_use_level_minus_one_dashes() {
        let slides = vec![
            slide(1, Some("Chapter 1"), 1, false),
            slide(2, Some("Section 1.1"), 2, false),
        ];
        let tree = build_outline_tree(&slides, |no| no);
        let lines = render_outline_lines(&tree);
        assert_eq!(lines, vec!["1||Chapter 1".to_string(), "2|-|Section 1.1".to_string()]);
    }

    #[test]
    fn untitled_slides_are_skipped() {
        let slides = vec![slide(1, None, 1, false), slide(2, Some("Only"), 1, false)];
        let tree = build_outline_tree(&slides, |no| no);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].title, "Only");
    }
}
