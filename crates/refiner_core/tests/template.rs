use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use refiner_core::{
    render_step_prompt, substitute_placeholders, MacroTable, NoMacros, Step, StepPrompt,
};

#[test]
fn replaces_every_occurrence() {
    let out = substitute_placeholders("{{draft}} / {{draft}} / {{savedMessages}}", "D", "S");
    assert_eq!(out, "D / D / S");
}

#[test]
fn values_are_not_rescanned() {
    let out = substitute_placeholders("[{{draft}}] [{{savedMessages}}]", "{{savedMessages}}", "{{draft}}");
    assert_eq!(out, "[{{savedMessages}}] [{{draft}}]");
}

#[test]
fn macros_run_after_placeholders() {
    let macros = MacroTable::new(BTreeMap::from([
        ("user".to_string(), "Alice".to_string()),
        ("char".to_string(), "Bob".to_string()),
    ]));
    let step = Step::new("s1", "Polish")
        .with_system_prompt("You edit for {{char}}.")
        .with_user_message("{{user}} wrote:\n{{draft}}");
    let prompt = render_step_prompt(&step, "Hi {{char}}", "", &macros);
    assert_eq!(prompt.system, "You edit for Bob.");
    assert_eq!(prompt.user, "Alice wrote:\nHi Bob");
}

#[test]
fn macro_values_are_not_expanded_again() {
    let macros = MacroTable::new(BTreeMap::from([
        ("char".to_string(), "{{user}}".to_string()),
        ("user".to_string(), "{{char}}".to_string()),
    ]));
    let step = Step::new("s1", "Swap").with_user_message("{{char}} and {{user}} and {{narrator}}");
    let prompt = render_step_prompt(&step, "", "", &macros);
    assert_eq!(prompt.user, "{{user}} and {{char}} and {{narrator}}");
}

#[test]
fn no_macros_is_identity() {
    let step = Step::new("s1", "Polish").with_user_message("{{user}}: {{draft}}");
    let prompt = render_step_prompt(&step, "text", "", &NoMacros);
    assert_eq!(prompt.user, "{{user}}: text");
}

#[test]
fn combined_prompt_skips_empty_parts() {
    let both = StepPrompt {
        system: "sys".into(),
        user: "usr".into(),
    };
    assert_eq!(both.combined(), "sys\n\nusr");

    let user_only = StepPrompt {
        system: String::new(),
        user: "usr".into(),
    };
    assert_eq!(user_only.combined(), "usr");
}
