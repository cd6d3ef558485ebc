use crawlkit::html::{css_to_xpath, Document, QueryCache, Scope};
use crawlkit::QueryError;
use std::sync::Arc;

const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Catalogue</title></head>
<body>
  <div id="main" class="content wide">
    <h1>Books</h1>
    <p class="intro">Pick one.</p>
    <ul class="books">
      <li class="book" data-id="1"><a href="/b/1">Dune</a></li>
      <li class="book sale" data-id="2"><a href="/b/2">Emma</a></li>
      <li class="book" data-id="3"><a href="/b/3.pdf">Ulysses</a></li>
      <li class="book sale" data-id="4"><a href="https://x.org/b/4">Beloved</a></li>
      <li class="ad">Sponsored</li>
    </ul>
    <p lang="en-GB">Colour</p>
    <p lang="en">Color</p>
  </div>
  <div id="footer"><p>Bye <span>now</span></p></div>
</body>
</html>"#;

fn texts(doc: &Document, css: &str) -> Vec<String> {
    doc.css(css)
        .unwrap()
        .texts()
        .into_iter()
        .map(|t| t.trim().to_string())
        .collect()
}

#[test]
fn class_id_and_type_selectors_match() {
    let doc = Document::parse(PAGE);
    assert_eq!(texts(&doc, ".sale"), ["Emma", "Beloved"]);
    assert_eq!(texts(&doc, "#main > h1"), ["Books"]);
    assert_eq!(texts(&doc, "div.content.wide > p.intro"), ["Pick one."]);
    assert_eq!(texts(&doc, "title"), ["Catalogue"]);
}

#[test]
fn nth_child_odd_matches_positions_one_three_five() {
    let doc = Document::parse(PAGE);
    assert_eq!(
        texts(&doc, "ul.books > li:nth-child(2n+1)"),
        ["Dune", "Ulysses", "Sponsored"]
    );
    assert_eq!(
        texts(&doc, "ul.books > li:nth-child(odd)"),
        texts(&doc, "ul.books > li:nth-child(2n+1)")
    );
    assert_eq!(texts(&doc, "li:nth-child(even)"), ["Emma", "Beloved"]);
    assert_eq!(texts(&doc, "li:nth-child(-n+2)"), ["Dune", "Emma"]);
    assert_eq!(texts(&doc, "li:nth-child(3)"), ["Ulysses"]);
}

#[test]
fn attribute_operators_match() {
    let doc = Document::parse(PAGE);
    assert_eq!(texts(&doc, r#"li[data-id="3"]"#), ["Ulysses"]);
    assert_eq!(texts(&doc, "a[href^='/b/']"), ["Dune", "Emma", "Ulysses"]);
    assert_eq!(texts(&doc, "a[href$='.pdf']"), ["Ulysses"]);
    assert_eq!(texts(&doc, "a[href*='x.org']"), ["Beloved"]);
    assert_eq!(texts(&doc, "li[class~=sale]"), ["Emma", "Beloved"]);
    assert_eq!(texts(&doc, "p[lang|=en]"), ["Colour", "Color"]);
    assert_eq!(texts(&doc, "li[data-id]").len(), 4);
}

#[test]
fn structural_and_negated_pseudo_classes_match() {
    let doc = Document::parse(PAGE);
    assert_eq!(texts(&doc, "ul > li:first-child"), ["Dune"]);
    assert_eq!(texts(&doc, "ul > li:last-child"), ["Sponsored"]);
    assert_eq!(texts(&doc, "#main > p:first-of-type"), ["Pick one."]);
    assert_eq!(texts(&doc, "#main > p:last-of-type"), ["Color"]);
    assert_eq!(texts(&doc, "#footer span:only-child"), ["now"]);
    assert_eq!(texts(&doc, "li:not(.book)"), ["Sponsored"]);
    assert_eq!(texts(&doc, "li.book:not(.sale) a"), ["Dune", "Ulysses"]);
}

#[test]
fn sibling_combinators_match() {
    let doc = Document::parse(PAGE);
    assert_eq!(texts(&doc, "h1 + p"), ["Pick one."]);
    assert_eq!(texts(&doc, "h1 ~ p"), ["Pick one.", "Colour", "Color"]);
    assert_eq!(texts(&doc, "li.sale + li"), ["Ulysses", "Sponsored"]);
}

#[test]
fn groups_are_returned_in_document_order() {
    let doc = Document::parse(PAGE);
    assert_eq!(texts(&doc, "span, h1"), ["Books", "now"]);
}

#[test]
fn nested_queries_are_scoped_to_the_node() {
    let doc = Document::parse(PAGE);
    let footer = doc.css("#footer").unwrap().first().unwrap();
    assert_eq!(footer.css("p").unwrap().len(), 1);
    assert_eq!(footer.xpath(".//span").unwrap().texts(), ["now"]);
    assert_eq!(footer.xpath("//span").unwrap().len(), 1);

    let books: Vec<_> = doc
        .css("li.book")
        .unwrap()
        .iter()
        .map(|li| {
            let link = li.css("a").unwrap().first().unwrap();
            (li.attr("data-id").unwrap(), link.attr("href").unwrap())
        })
        .collect();
    assert_eq!(books[0], ("1", "/b/1"));
    assert_eq!(books.len(), 4);
}

#[test]
fn xpath_extraction_helpers() {
    let doc = Document::parse(PAGE);
    let links = doc.xpath("//ul/li/a").unwrap();
    assert_eq!(links.attrs("href")[3], "https://x.org/b/4");
    assert_eq!(links.htmls()[0], r#"<a href="/b/1">Dune</a>"#);
    assert_eq!(
        doc.xpath("//li[@data-id=2]").unwrap().inner_htmls(),
        [r#"<a href="/b/2">Emma</a>"#]
    );
    assert_eq!(doc.xpath("//li[a]").unwrap().attrs("data-id"), ["1", "2", "3", "4"]);
    assert_eq!(doc.xpath("//li[last()]/@class").unwrap().texts(), ["ad"]);
}

#[test]
fn compiled_queries_are_shared_through_the_cache() {
    let cache = Arc::new(QueryCache::new(16));
    let first = cache.css("li.book", Scope::Global).unwrap();
    let again = cache.css("li.book", Scope::Global).unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    let uncached = QueryCache::disabled();
    let a = uncached.css("li.book", Scope::Global).unwrap();
    let b = uncached.css("li.book", Scope::Global).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(a, b);
}

#[test]
fn translation_matches_the_documented_forms() {
    let xpath = css_to_xpath(".foo", Scope::Global).unwrap();
    assert!(xpath.contains(r#"contains(concat(" ", @class, " "), " foo ")"#));
    let xpath = css_to_xpath(r#"div[data-x="1"]"#, Scope::Global).unwrap();
    assert!(xpath.contains(r#"self::div and @data-x="1""#));
}

#[test]
fn malformed_queries_fail_instead_of_matching_nothing() {
    let doc = Document::parse(PAGE);
    assert!(matches!(doc.css("li["), Err(QueryError::InvalidCss { .. })));
    assert!(matches!(doc.css("li >"), Err(QueryError::InvalidCss { .. })));
    assert!(matches!(
        doc.css("a:visited"),
        Err(QueryError::UnsupportedPseudoClass(_))
    ));
    assert!(matches!(
        doc.xpath("//li[@data-id="),
        Err(QueryError::InvalidXPath { .. })
    ));
}
