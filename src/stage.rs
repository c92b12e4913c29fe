use std::ffi::CString;
use std::fmt;
use std::path::PathBuf;

use crate::error::{PipelineError, Result};
use crate::redirects::{Stdin, Stdout};

/// One external program invocation within a pipeline.
///
/// The program name is looked up through `PATH` at exec time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    program: String,
    args: Vec<String>,
}

impl Stage {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Builds everything the forked child needs for `execvp`, so the child
    /// itself never allocates.
    pub(crate) fn exec_argv(&self, index: usize) -> Result<ExecArgv> {
        if self.program.is_empty() {
            return Err(PipelineError::invalid_stage(index, "empty program name"));
        }

        let mut strings = Vec::with_capacity(self.args.len() + 1);
        for part in std::iter::once(&self.program).chain(&self.args) {
            let c = CString::new(part.as_str()).map_err(|_| {
                PipelineError::invalid_stage(index, format!("NUL byte in {part:?}"))
            })?;
            strings.push(c);
        }

        let mut ptrs: Vec<*const libc::c_char> = strings.iter().map(|s| s.as_ptr()).collect();
        ptrs.push(std::ptr::null());

        Ok(ExecArgv {
            strings,
            ptrs,
            diagnostic: format!("rpipeline: {}: ", self.program).into_bytes(),
        })
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Null-terminated argv for `execvp` plus the prefix of the message written
/// when exec fails.
pub(crate) struct ExecArgv {
    // owns the bytes `ptrs` points into
    strings: Vec<CString>,
    ptrs: Vec<*const libc::c_char>,
    diagnostic: Vec<u8>,
}

impl ExecArgv {
    pub fn program(&self) -> *const libc::c_char {
        self.strings[0].as_ptr()
    }

    pub fn argv(&self) -> *const *const libc::c_char {
        self.ptrs.as_ptr()
    }

    pub fn diagnostic(&self) -> &[u8] {
        &self.diagnostic
    }
}

/// A parsed command line: the stages plus the redirects at either end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    pub stages: Vec<Stage>,
    pub stdin: Stdin,
    pub stdout: Stdout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Pipe,
    StdinFrom,
    StdoutTo,
    StdoutAppend,
}

impl Token {
    fn symbol(&self) -> &'static str {
        match self {
            Token::Word(_) => "word",
            Token::Pipe => "|",
            Token::StdinFrom => "<",
            Token::StdoutTo => ">",
            Token::StdoutAppend => ">>",
        }
    }
}

/// Splits `input` into stages on unquoted `|`.
///
/// e.g. `"grep 'a b' < in.txt | sed s/a/x/ >> out.txt"`
pub fn parse_command_line(input: &str) -> Result<CommandLine> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(PipelineError::parse("empty command line"));
    }

    let segments: Vec<&[Token]> = tokens.split(|t| *t == Token::Pipe).collect();
    let last = segments.len() - 1;
    let mut line = CommandLine::default();

    for (i, segment) in segments.iter().enumerate() {
        let mut words = Vec::new();
        let mut iter = segment.iter();

        while let Some(token) = iter.next() {
            if let Token::Word(word) = token {
                words.push(word.clone());
                continue;
            }

            let target = match iter.next() {
                Some(Token::Word(w)) => PathBuf::from(w),
                _ => {
                    return Err(PipelineError::parse(format!(
                        "expected file name after '{}'",
                        token.symbol()
                    )))
                }
            };

            match token {
                Token::StdinFrom if i == 0 => line.stdin = Stdin::File(target),
                Token::StdinFrom => {
                    return Err(PipelineError::parse(
                        "input redirect is only allowed on the first stage",
                    ))
                }
                Token::StdoutTo if i == last => line.stdout = Stdout::File(target),
                Token::StdoutAppend if i == last => line.stdout = Stdout::Append(target),
                _ => {
                    return Err(PipelineError::parse(
                        "output redirect is only allowed on the last stage",
                    ))
                }
            }
        }

        let mut words = words.into_iter();
        let Some(program) = words.next() else {
            return Err(PipelineError::parse(format!("empty command at stage {i}")));
        };
        line.stages.push(Stage::new(program).args(words));
    }

    Ok(line)
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    // set once a quote opens so that '' yields an empty argument
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = input.chars().peekable();

    fn flush(tokens: &mut Vec<Token>, current: &mut String, in_word: &mut bool) {
        if *in_word {
            tokens.push(Token::Word(std::mem::take(current)));
            *in_word = false;
        }
    }

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            } else {
                current.push(c);
            }
            continue;
        }

        match c {
            '"' | '\'' => {
                quote = Some(c);
                in_word = true;
            }
            '|' => {
                flush(&mut tokens, &mut current, &mut in_word);
                tokens.push(Token::Pipe);
            }
            '<' => {
                flush(&mut tokens, &mut current, &mut in_word);
                tokens.push(Token::StdinFrom);
            }
            '>' => {
                flush(&mut tokens, &mut current, &mut in_word);
                if chars.peek() == Some(&'>') {
                    chars.next();
                    tokens.push(Token::StdoutAppend);
                } else {
                    tokens.push(Token::StdoutTo);
                }
            }
            c if c.is_whitespace() => flush(&mut tokens, &mut current, &mut in_word),
            _ => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if let Some(q) = quote {
        return Err(PipelineError::parse(format!("unterminated {q} quote")));
    }
    flush(&mut tokens, &mut current, &mut in_word);

    Ok(tokens)
}
