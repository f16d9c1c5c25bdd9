use notegraph::{LinkExtractor, NotePath, Wiki, WikiConfig, WikiService};

fn names(v: &[NotePath]) -> Vec<&str> {
    v.iter().map(NotePath::as_str).collect()
}

#[test]
fn note_links_follow_configured_patterns() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let root = temp.path().join("wiki");
    std::fs::create_dir_all(root.join(".notegraph"))?;
    std::fs::write(
        root.join(".notegraph/config.toml"),
        r#"
link_patterns = ['\(\(([^()]+)\)\)', '[[(']
max_link_len = 20
"#,
    )?;
    std::fs::write(
        root.join("a.md"),
        "((b)) ((c.md|C)) [[ignored]] ((a-very-long-target-name))\n",
    )?;

    let wiki = Wiki::open(&root)?;
    assert_eq!(wiki.config().max_link_len, 20);

    let svc = WikiService::open(wiki);
    assert_eq!(svc.extractor().pattern_count(), 1);
    let links = svc.note_links(&NotePath::try_from("a.md")?)?;
    assert_eq!(names(&links), vec!["b.md", "c.md"]);
    Ok(())
}

#[test]
fn custom_note_extension_changes_accepted_targets() {
    let cfg = WikiConfig {
        note_extension: "txt".into(),
        ..WikiConfig::default()
    };
    let ex = LinkExtractor::new(&cfg);
    let links = ex.extract_links("[[plan]] [[plan.md]] [[log.txt]]");
    assert_eq!(names(&links), vec!["plan.txt", "log.txt"]);
}

#[test]
fn process_links_keeps_surrounding_text() {
    let ex = LinkExtractor::default();
    let src = "# Title\n\nRead [[docs/setup|the setup guide]] first.\n{{../shared/faq}}\n";
    let out = ex.process_links(src);
    assert_eq!(
        out,
        "# Title\n\nRead [the setup guide](docs/setup.md) first.\n[shared/faq](shared/faq.md)\n"
    );
}

#[test]
fn missing_note_content_is_an_error() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let svc = WikiService::open(Wiki::open(temp.path())?);
    assert!(svc.note_links(&NotePath::try_from("nope.md")?).is_err());
    Ok(())
}
