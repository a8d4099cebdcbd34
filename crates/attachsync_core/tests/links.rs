use attachsync_core::{scan_links, LinkKind, MarkdownLink};
use pretty_assertions::assert_eq;

fn scan(text: &str) -> Vec<MarkdownLink> {
    scan_links(text, true).collect()
}

#[test]
fn well_formed_links_are_found_with_exact_spans() {
    let text = "Intro [doc](notes/a.md) and ![pic](img/b.png)\n![x](https://cdn.example.com/c.jpg) end";
    let links = scan(text);

    assert_eq!(links.len(), 3);
    for link in &links {
        assert_eq!(link.full_match, &text[link.start..link.end]);
        assert!(link.end > link.start);
    }
    assert_eq!(links[0].url, "notes/a.md");
    assert_eq!(links[0].kind, LinkKind::Inline);
    assert_eq!(links[1].url, "img/b.png");
    assert_eq!(links[1].kind, LinkKind::Image);
    assert_eq!(links[2].url, "https://cdn.example.com/c.jpg");
}

#[test]
fn nested_brackets_in_label_stay_one_link() {
    let links = scan("see [a[b]c](http://x/y.png) here");

    assert_eq!(links.len(), 1);
    assert_eq!(links[0].url, "http://x/y.png");
    assert_eq!(links[0].label, "a[b]c");
    assert_eq!(links[0].full_match, "[a[b]c](http://x/y.png)");
}

#[test]
fn balanced_parens_in_destination_are_kept() {
    let links = scan("![chart](files/plot(1).png)");
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].url, "files/plot(1).png");
}

#[test]
fn unbalanced_brackets_do_not_hide_later_links() {
    let text = "[ unclosed label ( and ![ok](a.png) then [also](b.png";
    let links = scan(text);

    assert_eq!(links.len(), 1);
    assert_eq!(links[0].url, "a.png");
    assert_eq!(&text[links[0].start..links[0].end], "![ok](a.png)");
}

#[test]
fn label_without_destination_is_not_a_link() {
    assert!(scan("[just text] (not a link)").is_empty());
}

#[test]
fn wiki_links_are_optional() {
    let text = "![[photo one.png]] and [[Some Note|alias]] and [m](x.md)";

    let with_wiki = scan(text);
    assert_eq!(with_wiki.len(), 3);
    assert_eq!(with_wiki[0].kind, LinkKind::WikiEmbed);
    assert_eq!(with_wiki[0].url, "photo one.png");
    assert_eq!(with_wiki[1].kind, LinkKind::Wiki);
    assert_eq!(with_wiki[1].url, "Some Note|alias");
    assert_eq!(with_wiki[1].target(), "Some Note");
    assert_eq!(with_wiki[1].display_text(), "alias");

    let without_wiki: Vec<_> = scan_links(text, false).collect();
    assert_eq!(without_wiki.len(), 1);
    assert_eq!(without_wiki[0].url, "x.md");
}

#[test]
fn target_drops_angle_brackets_and_titles_but_keeps_spaces() {
    let links = scan("![a](<my file.png>) ![b](c.png \"Title\") ![d](./a b.png)");
    let targets: Vec<_> = links.iter().map(|link| link.target()).collect();
    assert_eq!(targets, vec!["my file.png", "c.png", "./a b.png"]);
}

#[test]
fn non_ascii_text_around_links_is_handled() {
    let text = "图片：![示例](资源/图 1.png)，完成";
    let links = scan(text);
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].url, "资源/图 1.png");
    assert_eq!(&text[links[0].start..links[0].end], links[0].full_match);
}

#[test]
fn scanning_is_restartable() {
    let text = "[a](1.png) [b](2.png)";
    let first: Vec<_> = scan_links(text, false).collect();
    let second: Vec<_> = scan_links(text, false).collect();
    assert_eq!(first, second);
    assert_eq!(scan_links(text, false).take(1).count(), 1);
}
