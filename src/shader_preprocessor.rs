//! Line-based conditional compilation and token substitution for WGSL sources.
//!
//! Directives occupy a whole line: `#if name`, `#elseif name`, `#else`, `#endif`.
//! A condition holds only when `checks[name]` is `true`. Tokens of the form
//! `##NAME##` or `##NAME=default##` are replaced after the conditional pass.

use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PreprocessError {
    #[error("line {line}: `{directive}` without a matching #if")]
    MismatchedDirective { directive: &'static str, line: usize },
    #[error("line {line}: conditional directive is missing its condition")]
    MissingCondition { line: usize },
    #[error("#if block is not closed by #endif")]
    UnterminatedBlock,
    #[error("no define value or default value for '{name}'")]
    MissingDefine { name: String },
}

#[derive(Debug, Clone, Copy)]
struct Block {
    parent_active: bool,
    active: bool,
    taken: bool,
}

enum Directive<'a> {
    If(Option<&'a str>),
    ElseIf(Option<&'a str>),
    Else,
    EndIf,
}

fn condition(rest: &str) -> Option<&str> {
    let rest = rest.trim();
    (!rest.is_empty()).then_some(rest)
}

fn parse_directive(line: &str) -> Option<Directive<'_>> {
    let trimmed = line.trim();
    if let Some(rest) = trimmed.strip_prefix("#elseif") {
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            return Some(Directive::ElseIf(condition(rest)));
        }
    }
    if let Some(rest) = trimmed.strip_prefix("#else") {
        if rest.trim().is_empty() {
            return Some(Directive::Else);
        }
    }
    if let Some(rest) = trimmed.strip_prefix("#endif") {
        if rest.trim().is_empty() {
            return Some(Directive::EndIf);
        }
    }
    if let Some(rest) = trimmed.strip_prefix("#if") {
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            return Some(Directive::If(condition(rest)));
        }
    }
    None
}

pub fn preprocess(
    source: &str,
    defines: &HashMap<&str, &str>,
    checks: &HashMap<&str, bool>,
) -> Result<String, PreprocessError> {
    let holds = |name: &str| checks.get(name).copied().unwrap_or(false);
    let mut stack: Vec<Block> = Vec::new();
    let mut output = String::with_capacity(source.len());

    for (idx, line) in source.lines().enumerate() {
        let line_no = idx + 1;
        let emitting = stack.last().map(|block| block.active).unwrap_or(true);
        match parse_directive(line) {
            Some(Directive::If(condition)) => {
                let condition = condition.ok_or(PreprocessError::MissingCondition { line: line_no })?;
                let active = emitting && holds(condition);
                stack.push(Block { parent_active: emitting, active, taken: active });
            }
            Some(Directive::ElseIf(condition)) => {
                let condition = condition.ok_or(PreprocessError::MissingCondition { line: line_no })?;
                let block = stack
                    .last_mut()
                    .ok_or(PreprocessError::MismatchedDirective { directive: "#elseif", line: line_no })?;
                block.active = block.parent_active && !block.taken && holds(condition);
                block.taken |= block.active;
            }
            Some(Directive::Else) => {
                let block = stack
                    .last_mut()
                    .ok_or(PreprocessError::MismatchedDirective { directive: "#else", line: line_no })?;
                block.active = block.parent_active && !block.taken;
                block.taken = true;
            }
            Some(Directive::EndIf) => {
                stack.pop().ok_or(PreprocessError::MismatchedDirective { directive: "#endif", line: line_no })?;
            }
            None if emitting => {
                output.push_str(line);
                output.push('\n');
            }
            None => {}
        }
    }

    if !stack.is_empty() {
        return Err(PreprocessError::UnterminatedBlock);
    }
    substitute_tokens(&output, defines)
}

fn substitute_tokens(text: &str, defines: &HashMap<&str, &str>) -> Result<String, PreprocessError> {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("##") {
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("##") else {
            break;
        };
        let token = &after_open[..end];
        if token.is_empty() || token.contains('\n') {
            result.push_str(&rest[..start + 2]);
            rest = after_open;
            continue;
        }
        let (name, default) = match token.split_once('=') {
            Some((name, default)) => (name, Some(default)),
            None => (token, None),
        };
        let value = defines
            .get(name)
            .copied()
            .or(default)
            .ok_or_else(|| PreprocessError::MissingDefine { name: name.to_string() })?;
        result.push_str(&rest[..start]);
        result.push_str(value);
        rest = &after_open[end + 2..];
    }
    result.push_str(rest);
    Ok(result)
}
