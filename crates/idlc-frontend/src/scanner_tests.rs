use std::fs;

use indoc::indoc;

use idlc_core::annotations::AnnotationValue;
use idlc_core::pos::Position;
use idlc_core::value::Value;

use crate::scanner::{Directives, Scanner, Token};
use crate::Error;

fn scan(text: &str) -> Scanner<()> {
    Scanner::new("test.idl", text, ())
}

fn tokens_of<D: Directives>(scanner: &mut Scanner<D>) -> Vec<Token> {
    let mut out = Vec::new();
    loop {
        let (tok, _) = scanner.next_token().unwrap();
        if tok == Token::Eof {
            return out;
        }
        out.push(tok);
    }
}

fn tokens(text: &str) -> Vec<Token> {
    tokens_of(&mut scan(text))
}

fn err_of<D: Directives>(scanner: &mut Scanner<D>) -> Error {
    loop {
        match scanner.next_token() {
            Ok((Token::Eof, _)) => panic!("expected a scan error"),
            Ok(_) => {}
            Err(e) => return e,
        }
    }
}

fn scan_err(text: &str) -> String {
    err_of(&mut scan(text)).to_string()
}

fn ident(s: &str) -> Token {
    Token::Identifier(s.to_string())
}

#[test]
fn keywords_and_identifiers() {
    assert_eq!(
        tokens("module Foo { typedef long Bar; };"),
        vec![
            Token::Keyword("module"),
            ident("Foo"),
            Token::Punct('{'),
            Token::Keyword("typedef"),
            Token::Keyword("long"),
            ident("Bar"),
            Token::Punct(';'),
            Token::Punct('}'),
            Token::Punct(';'),
        ]
    );
}

#[test]
fn keywords_match_case_insensitively_but_must_be_spelled_right() {
    let err = scan_err("Module");
    assert!(err.contains("collides with IDL keyword 'module'"), "{err}");
    assert_eq!(tokens("TRUE FALSE Object"), vec![
        Token::Keyword("TRUE"),
        Token::Keyword("FALSE"),
        Token::Keyword("Object"),
    ]);
}

#[test]
fn a_leading_underscore_escapes_an_identifier() {
    // the spelling is kept; Identifier construction strips the escape
    assert_eq!(tokens("_module _union"), vec![ident("_module"), ident("_union")]);
}

#[test]
fn an_escape_must_precede_a_letter() {
    let err = scan_err("_3");
    assert!(err.contains("malformed escaped identifier"), "{err}");
    let err = scan_err("_ x");
    assert!(err.contains("malformed escaped identifier"), "{err}");
}

#[test]
fn number_literal_forms() {
    assert_eq!(
        tokens("42 0x2A 052 3.5 1e3 1.5d 2D"),
        vec![
            Token::Integer(42),
            Token::Integer(42),
            Token::Integer(42),
            Token::Float(3.5),
            Token::Float(1000.0),
            Token::Fixed("1.5".to_string()),
            Token::Fixed("2".to_string()),
        ]
    );
}

#[test]
fn octal_literals_reject_digits_8_and_9() {
    let err = scan_err("09");
    assert!(err.contains("octal"), "{err}");
}

#[test]
fn char_and_string_escapes() {
    assert_eq!(
        tokens(r"'\n' '\x41' '\101'"),
        vec![Token::Char(b'\n'), Token::Char(b'A'), Token::Char(b'A')]
    );
    assert_eq!(
        tokens(r#""a\tb""#),
        vec![Token::Str("a\tb".to_string())]
    );
}

#[test]
fn adjacent_string_literals_concatenate() {
    assert_eq!(tokens(r#""foo" "bar""#), vec![Token::Str("foobar".to_string())]);
}

#[test]
fn wide_literals_take_universal_names() {
    assert_eq!(
        tokens(r#"L'☮' L"w""#),
        vec![Token::WChar('\u{262e}'), Token::WStr("w".to_string())]
    );
    let err = scan_err(r"'\u0041'");
    assert!(err.contains("narrow"), "{err}");
}

#[test]
fn scope_and_shift_operators() {
    assert_eq!(
        tokens("A::B << >> < >"),
        vec![
            ident("A"),
            Token::ScopeSep,
            ident("B"),
            Token::ShiftLeft,
            Token::ShiftRight,
            Token::Punct('<'),
            Token::Punct('>'),
        ]
    );
}

#[test]
fn comments_are_skipped() {
    assert_eq!(tokens("/* block\ncomment */ a // rest\nb"), vec![ident("a"), ident("b")]);
}

#[test]
fn macros_expand_into_the_token_stream() {
    let text = indoc! {"
        #define WIDTH 42
        const long w = WIDTH;
    "};
    let toks = tokens(text);
    assert!(toks.contains(&Token::Integer(42)), "{toks:?}");
}

#[test]
fn circular_macro_expansion_is_detected() {
    let err = scan_err(indoc! {"
        #define A B
        #define B A
        A
    "});
    assert!(err.contains("circular macro expansion"), "{err}");
}

#[test]
fn self_referential_macros_are_detected() {
    let err = scan_err("#define A A\nA\n");
    assert!(err.contains("circular macro expansion"), "{err}");
}

#[test]
fn a_macro_may_be_used_repeatedly() {
    let text = indoc! {"
        #define N 7
        N N
    "};
    assert_eq!(tokens(text), vec![Token::Integer(7), Token::Integer(7)]);
}

#[test]
fn macros_may_chain_without_cycling() {
    let text = indoc! {"
        #define INNER 5
        #define OUTER INNER
        OUTER OUTER
    "};
    assert_eq!(tokens(text), vec![Token::Integer(5), Token::Integer(5)]);
}

#[test]
fn conditionals_select_one_branch() {
    let text = indoc! {"
        #define VERSION 3
        #if VERSION > 3
        first
        #elif VERSION == 3
        second
        #else
        third
        #endif
    "};
    assert_eq!(tokens(text), vec![ident("second")]);
}

#[test]
fn unknown_words_count_as_zero_in_conditions() {
    assert_eq!(tokens("#if UNDEFINED\nx\n#endif\ny"), vec![ident("y")]);
}

#[test]
fn ifdef_sees_api_level_defines() {
    let mut scanner = scan(indoc! {"
        #ifdef FOO
        a
        #endif
        #ifndef FOO
        b
        #endif
    "});
    scanner.define("FOO", "");
    assert_eq!(tokens_of(&mut scanner), vec![ident("a")]);
}

#[test]
fn defined_tests_macro_existence() {
    let mut scanner = scan(indoc! {"
        #define FOO 1
        #if defined(FOO) && !defined BAR
        yes
        #endif
        #if defined ( FOO )
        also
        #endif
    "});
    assert_eq!(tokens_of(&mut scanner), vec![ident("yes"), ident("also")]);
}

#[test]
fn redefining_a_macro_is_an_error() {
    let err = scan_err("#define A 1\n#define A 2\n");
    assert!(err.contains("duplicate #define"), "{err}");
}

#[test]
fn nested_dead_regions_stay_dead() {
    let text = indoc! {"
        #if 0
        #if 1
        x
        #endif
        y
        #endif
        z
    "};
    assert_eq!(tokens(text), vec![ident("z")]);
}

#[test]
fn dead_branches_do_not_define_macros() {
    let text = indoc! {"
        #if 0
        #define GONE 1
        #endif
        #ifdef GONE
        x
        #endif
    "};
    assert_eq!(tokens(text), vec![]);
}

#[test]
fn missing_endif_is_reported() {
    let err = scan_err("#if 1\nx");
    assert!(err.contains("missing #endif"), "{err}");
}

#[test]
fn error_directive_aborts() {
    let err = scan_err("#error broken build");
    assert!(err.contains("broken build"), "{err}");
}

#[test]
fn unknown_directives_are_rejected_but_line_markers_pass() {
    let err = scan_err("#frobnicate");
    assert!(err.contains("unknown preprocessor directive"), "{err}");
    assert_eq!(tokens("# 1 \"file.idl\"\nx"), vec![ident("x")]);
}

#[test]
fn directive_lines_continue_over_backslash_newline() {
    let text = indoc! {r"
        #define BIG 1 + \
            2
        #if BIG == 3
        yes
        #endif
    "};
    assert_eq!(tokens(text), vec![ident("yes")]);
}

#[test]
fn shift_and_parens_in_conditions() {
    assert_eq!(tokens("#if (1 << 4) == 16\nok\n#endif"), vec![ident("ok")]);
}

#[test]
fn division_by_zero_in_a_condition_is_an_error() {
    let err = scan_err("#if 1 / 0\n#endif");
    assert!(err.contains("division by zero"), "{err}");
}

#[test]
fn positions_track_line_and_column() {
    let mut scanner = scan("module\n  Foo;");
    let (_, pos) = scanner.next_token().unwrap();
    assert_eq!((pos.line, pos.column), (1, 1));
    let (_, pos) = scanner.next_token().unwrap();
    assert_eq!((pos.line, pos.column), (2, 3));
}

#[test]
fn pending_annotations_are_collected() {
    let mut scanner = scan("@id(3) @autoid(HASH) struct S");
    let (tok, _) = scanner.next_token().unwrap();
    assert_eq!(tok, Token::Keyword("struct"));
    let anns = scanner.take_annotations();
    assert_eq!(anns.len(), 2);
    let id = anns.first_by_id("id").unwrap();
    assert_eq!(id.value(), Some(&AnnotationValue::Literal(Value::Int(3))));
    let autoid = anns.first_by_id("autoid").unwrap();
    assert_eq!(autoid.value(), Some(&AnnotationValue::Symbol("HASH".to_string())));
}

#[test]
fn keyed_and_list_annotation_bodies() {
    let mut scanner = scan(r#"@verbatim(language="c++", text="// x") @range({1, 2, 3}) x"#);
    scanner.next_token().unwrap();
    let anns = scanner.take_annotations();
    let verbatim = anns.first_by_id("verbatim").unwrap();
    assert_eq!(
        verbatim.field("language"),
        Some(&AnnotationValue::Literal(Value::Str("c++".to_string())))
    );
    let range = anns.first_by_id("range").unwrap();
    assert_eq!(
        range.value(),
        Some(&AnnotationValue::List(vec![
            AnnotationValue::Literal(Value::Int(1)),
            AnnotationValue::Literal(Value::Int(2)),
            AnnotationValue::Literal(Value::Int(3)),
        ]))
    );
}

#[test]
fn annotation_values_take_scoped_names_and_negatives() {
    let mut scanner = scan("@min(-4) @unit(Units::METERS) x");
    scanner.next_token().unwrap();
    let anns = scanner.take_annotations();
    let min = anns.first_by_id("min").unwrap();
    assert_eq!(min.value(), Some(&AnnotationValue::Literal(Value::Int(-4))));
    let unit = anns.first_by_id("unit").unwrap();
    assert_eq!(unit.value(), Some(&AnnotationValue::Symbol("Units::METERS".to_string())));
}

#[test]
fn annotation_ids_may_collide_with_keywords() {
    let mut scanner = scan("@default(RED) x");
    scanner.next_token().unwrap();
    let anns = scanner.take_annotations();
    assert!(anns.first_by_id("default").is_some());
}

#[test]
fn trailing_comment_annotations() {
    let mut scanner = scan("long x; //@key\n");
    for _ in 0..3 {
        scanner.next_token().unwrap();
    }
    assert_eq!(scanner.next_token().unwrap().0, Token::Eof);
    let anns = scanner.take_trailing_annotations();
    assert!(anns.first_by_id("key").is_some());
}

/// Records directive callbacks; re-includes of a seen path are declined.
#[derive(Default)]
struct Recorder {
    events: Vec<String>,
    seen: Vec<String>,
}

impl Directives for Recorder {
    fn enter_include(&mut self, filename: &str, fullpath: &str) -> Result<bool, Error> {
        if self.seen.iter().any(|p| p == fullpath) {
            return Ok(false);
        }
        self.seen.push(fullpath.to_string());
        self.events.push(format!("enter {filename}"));
        Ok(true)
    }

    fn leave_include(&mut self) -> Result<(), Error> {
        self.events.push("leave".to_string());
        Ok(())
    }

    fn declare_include(&mut self, filename: &str, _fullpath: &str) -> Result<(), Error> {
        self.events.push(format!("declare {filename}"));
        Ok(())
    }

    fn pragma_id(&mut self, name: &str, id: &str, _pos: &Position) -> Result<(), Error> {
        self.events.push(format!("id {name} {id}"));
        Ok(())
    }

    fn pragma_version(&mut self, name: &str, version: &str, _pos: &Position) -> Result<(), Error> {
        self.events.push(format!("version {name} {version}"));
        Ok(())
    }

    fn pragma_prefix(&mut self, prefix: &str, _pos: &Position) -> Result<(), Error> {
        self.events.push(format!("prefix {prefix}"));
        Ok(())
    }

    fn handle_pragma(&mut self, text: &str, _pos: &Position) -> Result<bool, Error> {
        self.events.push(format!("pragma {text}"));
        Ok(false)
    }
}

#[test]
fn quoted_includes_are_scanned_in_place() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("defs.idl"), "typedef long T;\n").unwrap();
    fs::write(
        dir.path().join("main.idl"),
        indoc! {r#"
            #include "defs.idl"
            module M {};
        "#},
    )
    .unwrap();

    let mut scanner = Scanner::from_file(dir.path().join("main.idl"), Recorder::default()).unwrap();
    let toks = tokens_of(&mut scanner);
    assert_eq!(toks[..3], [Token::Keyword("typedef"), Token::Keyword("long"), ident("T")]);
    assert_eq!(
        scanner.directives().events,
        vec!["enter defs.idl".to_string(), "leave".to_string()]
    );
}

#[test]
fn repeated_includes_are_declared_not_rescanned() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("defs.idl"), "typedef long T;\n").unwrap();
    fs::write(
        dir.path().join("main.idl"),
        indoc! {r#"
            #include "defs.idl"
            #include "defs.idl"
        "#},
    )
    .unwrap();

    let mut scanner = Scanner::from_file(dir.path().join("main.idl"), Recorder::default()).unwrap();
    tokens_of(&mut scanner);
    assert_eq!(
        scanner.directives().events,
        vec![
            "enter defs.idl".to_string(),
            "leave".to_string(),
            "declare defs.idl".to_string(),
        ]
    );
}

#[test]
fn angle_includes_search_registered_paths_only() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("sys.idl"), "const short N = 1;\n").unwrap();

    let mut scanner = Scanner::new("main.idl", "#include <sys.idl>\n", Recorder::default());
    assert!(matches!(scanner.next_token(), Err(Error::Parse(_))));

    let mut scanner = Scanner::new("main.idl", "#include <sys.idl>\n", Recorder::default());
    scanner.add_include_path(dir.path());
    let toks = tokens_of(&mut scanner);
    assert_eq!(toks[0], Token::Keyword("const"));
}

#[test]
fn missing_includes_are_reported() {
    let err = scan_err("#include \"no_such_file.idl\"");
    assert!(err.contains("cannot open include file"), "{err}");
}

#[test]
fn errors_in_includes_carry_the_include_chain() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("defs.idl"), "#error boom\n").unwrap();
    fs::write(dir.path().join("main.idl"), "#include \"defs.idl\"\n").unwrap();

    let mut scanner = Scanner::from_file(dir.path().join("main.idl"), Recorder::default()).unwrap();
    let Error::Parse(parse) = err_of(&mut scanner) else {
        panic!("expected a parse error");
    };
    assert_eq!(parse.positions.len(), 2);
    assert!(parse.positions[0].source.ends_with("defs.idl"));
    assert!(parse.positions[1].source.ends_with("main.idl"));
    assert!(parse.to_string().contains("included from"), "{parse}");
}

#[test]
fn conditionals_must_close_within_their_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("defs.idl"), "#if 1\ntypedef long T;\n").unwrap();
    fs::write(
        dir.path().join("main.idl"),
        indoc! {r#"
            #include "defs.idl"
            #endif
        "#},
    )
    .unwrap();

    let mut scanner = Scanner::from_file(dir.path().join("main.idl"), Recorder::default()).unwrap();
    let err = err_of(&mut scanner).to_string();
    assert!(err.contains("missing #endif at end of include"), "{err}");
}

#[test]
fn quoted_include_directories_last_for_the_frame_only() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("sub").join("helper.idl"), "typedef long H;\n").unwrap();
    fs::write(dir.path().join("sub").join("defs.idl"), "#include \"helper.idl\"\n").unwrap();
    fs::write(
        dir.path().join("main.idl"),
        indoc! {r#"
            #include "sub/defs.idl"
            #include "helper.idl"
        "#},
    )
    .unwrap();

    // "helper.idl" resolves inside sub/defs.idl but not afterwards:
    // the sub directory is dropped when that include frame ends
    let mut scanner = Scanner::from_file(dir.path().join("main.idl"), Recorder::default()).unwrap();
    let err = err_of(&mut scanner).to_string();
    assert!(err.contains("cannot open include file 'helper.idl'"), "{err}");
}

#[test]
fn pragma_directives_reach_the_sink() {
    let text = indoc! {r#"
        #pragma ID Foo "IDL:acme.org/Foo:1.3"
        #pragma version Foo 1.3
        #pragma prefix "acme.org"
        #pragma custom anything goes
    "#};
    let mut scanner = Scanner::new("main.idl", text, Recorder::default());
    tokens_of(&mut scanner);
    assert_eq!(
        scanner.directives().events,
        vec![
            "id Foo IDL:acme.org/Foo:1.3".to_string(),
            "version Foo 1.3".to_string(),
            "prefix acme.org".to_string(),
            "pragma custom anything goes".to_string(),
        ]
    );
}

#[test]
fn unhandled_pragmas_become_warnings() {
    let mut scanner = scan("#pragma mystery 1\nmodule M {};\n");
    tokens_of(&mut scanner);
    assert!(!scanner.diagnostics().is_empty());
    assert_eq!(scanner.diagnostics().warning_count(), 1);
    let warning = scanner.diagnostics().iter().next().unwrap();
    assert!(warning.message.contains("mystery"), "{warning}");
    assert!(warning.position.is_some());
}
