use super::ast::*;
use super::lexer::{Lexer, Token};
use crate::error::ParseError;
use crate::types::ID_MAX;

/// Parse `.proto` source text into a schema description.
pub fn parse_schema(input: &str) -> Result<ProtoFile, ParseError> {
    Parser::new(input).parse_file()
}

/// Deepest nesting of message bodies and aggregate option values.
const MAX_NESTING: usize = 100;

fn syntax_error(line: usize, message: impl Into<String>) -> ParseError {
    ParseError::Syntax {
        line,
        message: message.into(),
    }
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    syntax: Syntax,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Parser {
            lexer: Lexer::new(input),
            syntax: Syntax::Proto2,
            depth: 0,
        }
    }

    fn parse_file(mut self) -> Result<ProtoFile, ParseError> {
        let mut file = ProtoFile::default();

        loop {
            let tok = self.lexer.next_token()?;
            let keyword = match &tok.token {
                Token::Eof => break,
                Token::Symbol(';') => continue,
                Token::Ident(kw) => kw.clone(),
                other => {
                    return Err(syntax_error(
                        tok.line,
                        format!("expected a top-level statement, found {other}"),
                    ))
                }
            };

            match keyword.as_str() {
                "syntax" => self.parse_syntax(tok.line)?,
                "package" => {
                    if file.package.is_some() {
                        return Err(syntax_error(tok.line, "duplicate package statement"));
                    }
                    let package = self.expect_path()?;
                    if package.starts_with('.') {
                        return Err(syntax_error(
                            tok.line,
                            format!("illegal package name '{package}'"),
                        ));
                    }
                    self.expect_symbol(';')?;
                    file.package = Some(package);
                }
                "import" => file.imports.push(self.parse_import()?),
                "option" => {
                    let (name, value) = self.parse_option_assignment()?;
                    self.expect_symbol(';')?;
                    file.options.insert(name, value);
                }
                "message" => file.messages.push(self.parse_message(tok.line)?),
                "enum" => file.enums.push(self.parse_enum(tok.line)?),
                "service" => file.services.push(self.parse_service(tok.line)?),
                "extend" => file.extends.push(self.parse_extend(tok.line)?),
                _ => {
                    return Err(syntax_error(
                        tok.line,
                        format!("unexpected '{keyword}' at top level"),
                    ))
                }
            }
        }

        file.syntax = self.syntax;
        Ok(file)
    }

    fn parse_syntax(&mut self, line: usize) -> Result<(), ParseError> {
        self.expect_symbol('=')?;
        let value = self.expect_string()?;
        self.syntax = match value.as_str() {
            "proto2" => Syntax::Proto2,
            "proto3" => Syntax::Proto3,
            _ => return Err(syntax_error(line, format!("unsupported syntax \"{value}\""))),
        };
        self.expect_symbol(';')?;
        Ok(())
    }

    fn parse_import(&mut self) -> Result<String, ParseError> {
        let tok = self.lexer.next_token()?;
        let path = match tok.token {
            Token::Ident(ref kw) if kw == "public" || kw == "weak" => self.expect_string()?,
            Token::Str(path) => path,
            other => {
                return Err(syntax_error(
                    tok.line,
                    format!("expected import path, found {other}"),
                ))
            }
        };
        self.expect_symbol(';')?;
        Ok(path)
    }

    // ---- messages ----

    fn parse_message(&mut self, line: usize) -> Result<MessageDef, ParseError> {
        let name = self.expect_name()?;
        let mut msg = MessageDef::new(name);
        msg.line = line;
        self.parse_message_body(&mut msg)?;
        Ok(msg)
    }

    /// Run `body` one nesting level deeper, failing past [`MAX_NESTING`].
    fn nested<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(syntax_error(
                self.lexer.current_line(),
                format!("nesting deeper than {MAX_NESTING} levels"),
            ));
        }
        self.depth += 1;
        let result = body(self);
        self.depth -= 1;
        result
    }

    fn parse_message_body(&mut self, msg: &mut MessageDef) -> Result<(), ParseError> {
        self.expect_symbol('{')?;
        self.nested(|p| p.parse_message_members(msg))
    }

    fn parse_message_members(&mut self, msg: &mut MessageDef) -> Result<(), ParseError> {
        loop {
            let tok = self.lexer.next_token()?;
            let keyword = match &tok.token {
                Token::Symbol('}') => return Ok(()),
                Token::Symbol(';') => continue,
                Token::Ident(kw) => kw.clone(),
                other => {
                    return Err(syntax_error(
                        tok.line,
                        format!("unexpected {other} in message '{}'", msg.name),
                    ))
                }
            };

            match keyword.as_str() {
                "message" => {
                    let nested = self.parse_message(tok.line)?;
                    msg.messages.push(nested);
                }
                "enum" => msg.enums.push(self.parse_enum(tok.line)?),
                "oneof" => self.parse_oneof(msg)?,
                "extensions" => {
                    let ranges = self.parse_ranges()?;
                    msg.extensions.extend(ranges);
                }
                "reserved" => {
                    let reserved = self.parse_reserved()?;
                    msg.reserved.extend(reserved);
                }
                "option" => {
                    let (name, value) = self.parse_option_assignment()?;
                    self.expect_symbol(';')?;
                    msg.options.insert(name, value);
                }
                "extend" => msg.extends.push(self.parse_extend(tok.line)?),
                "required" | "optional" | "repeated" => {
                    let parsed = self.parse_field(Some(rule_keyword(&keyword)), None, tok.line)?;
                    push_field(msg, parsed);
                }
                "map" if self.next_is_symbol('<')? => {
                    let field = self.parse_map_field(tok.line)?;
                    msg.fields.push(field);
                }
                _ => {
                    let line = tok.line;
                    self.lexer.push_back(tok);
                    let parsed = self.parse_field(None, None, line)?;
                    push_field(msg, parsed);
                }
            }
        }
    }

    /// Parse a field declaration after its label. Groups also yield their body.
    fn parse_field(
        &mut self,
        rule: Option<Rule>,
        oneof: Option<&str>,
        line: usize,
    ) -> Result<(FieldDef, Option<MessageDef>), ParseError> {
        let rule = match rule {
            Some(Rule::Required) if self.syntax == Syntax::Proto3 => {
                return Err(syntax_error(line, "required fields are not allowed in proto3"))
            }
            Some(rule) => rule,
            None if oneof.is_some() => Rule::Optional,
            None if self.syntax == Syntax::Proto3 => Rule::Implicit,
            None => {
                return Err(syntax_error(
                    line,
                    "missing field rule (required, optional or repeated)",
                ))
            }
        };

        let type_name = self.expect_path()?;
        if type_name == "group" {
            let (field, group) = self.parse_group(rule, oneof, line)?;
            return Ok((field, Some(group)));
        }

        let name = self.expect_name()?;
        self.expect_symbol('=')?;
        let id = self.expect_field_id()?;
        let options = self.parse_field_options()?;
        self.expect_symbol(';')?;

        Ok((
            FieldDef {
                rule,
                type_name,
                key_type: None,
                name,
                id,
                options,
                oneof: oneof.map(str::to_string),
                line,
            },
            None,
        ))
    }

    fn parse_group(
        &mut self,
        rule: Rule,
        oneof: Option<&str>,
        line: usize,
    ) -> Result<(FieldDef, MessageDef), ParseError> {
        if self.syntax == Syntax::Proto3 {
            return Err(syntax_error(line, "groups are not allowed in proto3"));
        }
        let name = self.expect_name()?;
        if !name.starts_with(|c: char| c.is_ascii_uppercase()) {
            return Err(syntax_error(
                line,
                format!("group name '{name}' must start with a capital letter"),
            ));
        }
        self.expect_symbol('=')?;
        let id = self.expect_field_id()?;
        let options = self.parse_field_options()?;

        let mut group = MessageDef::new(name.clone());
        group.is_group = true;
        group.line = line;
        self.parse_message_body(&mut group)?;

        let field = FieldDef {
            rule,
            type_name: name.clone(),
            key_type: None,
            name: name.to_lowercase(),
            id,
            options,
            oneof: oneof.map(str::to_string),
            line,
        };
        Ok((field, group))
    }

    fn parse_map_field(&mut self, line: usize) -> Result<FieldDef, ParseError> {
        self.expect_symbol('<')?;
        let key_type = self.expect_path()?;
        self.expect_symbol(',')?;
        let value_type = self.expect_path()?;
        self.expect_symbol('>')?;
        let name = self.expect_name()?;
        self.expect_symbol('=')?;
        let id = self.expect_field_id()?;
        let options = self.parse_field_options()?;
        self.expect_symbol(';')?;

        Ok(FieldDef {
            rule: Rule::Map,
            type_name: value_type,
            key_type: Some(key_type),
            name,
            id,
            options,
            oneof: None,
            line,
        })
    }

    fn parse_oneof(&mut self, msg: &mut MessageDef) -> Result<(), ParseError> {
        let name = self.expect_name()?;
        let mut oneof = OneOfDef {
            name: name.clone(),
            options: Options::new(),
        };
        self.expect_symbol('{')?;

        loop {
            let tok = self.lexer.next_token()?;
            let keyword = match &tok.token {
                Token::Symbol('}') => break,
                Token::Symbol(';') => continue,
                Token::Ident(kw) => kw.clone(),
                other => {
                    return Err(syntax_error(
                        tok.line,
                        format!("unexpected {other} in oneof '{name}'"),
                    ))
                }
            };

            match keyword.as_str() {
                "option" => {
                    let (opt, value) = self.parse_option_assignment()?;
                    self.expect_symbol(';')?;
                    oneof.options.insert(opt, value);
                }
                "required" | "optional" | "repeated" => {
                    return Err(syntax_error(
                        tok.line,
                        format!("fields in oneof '{name}' must not have a label"),
                    ))
                }
                _ => {
                    let line = tok.line;
                    self.lexer.push_back(tok);
                    let parsed = self.parse_field(None, Some(&name), line)?;
                    push_field(msg, parsed);
                }
            }
        }

        msg.oneofs.push(oneof);
        Ok(())
    }

    /// `N`, `N to M` and `N to max`, comma separated, up to the closing `;`.
    fn parse_ranges(&mut self) -> Result<Vec<(u32, u32)>, ParseError> {
        let mut ranges = Vec::new();
        loop {
            let start = self.expect_field_id()?;
            let end = if self.consume_ident("to")? {
                if self.consume_ident("max")? {
                    ID_MAX
                } else {
                    self.expect_field_id()?
                }
            } else {
                start
            };
            ranges.push((start, end));
            if !self.consume_symbol(',')? {
                break;
            }
        }
        // extension range options carry nothing the runtime uses
        self.parse_field_options()?;
        self.expect_symbol(';')?;
        Ok(ranges)
    }

    fn parse_reserved(&mut self) -> Result<Vec<Reserved>, ParseError> {
        if let Token::Str(_) = self.lexer.peek_token()?.token {
            let mut names = Vec::new();
            loop {
                names.push(Reserved::Name(self.expect_string()?));
                if !self.consume_symbol(',')? {
                    break;
                }
            }
            self.expect_symbol(';')?;
            return Ok(names);
        }
        Ok(self
            .parse_ranges()?
            .into_iter()
            .map(|(start, end)| Reserved::Range(start, end))
            .collect())
    }

    // ---- enums ----

    fn parse_enum(&mut self, line: usize) -> Result<EnumDef, ParseError> {
        let name = self.expect_name()?;
        let mut def = EnumDef {
            name,
            values: Vec::new(),
            options: Options::new(),
            line,
        };
        self.expect_symbol('{')?;

        loop {
            let tok = self.lexer.next_token()?;
            let keyword = match &tok.token {
                Token::Symbol('}') => break,
                Token::Symbol(';') => continue,
                Token::Ident(kw) => kw.clone(),
                other => {
                    return Err(syntax_error(
                        tok.line,
                        format!("unexpected {other} in enum '{}'", def.name),
                    ))
                }
            };

            match keyword.as_str() {
                "option" => {
                    let (name, value) = self.parse_option_assignment()?;
                    self.expect_symbol(';')?;
                    def.options.insert(name, value);
                }
                "reserved" => self.skip_statement()?,
                _ => {
                    if keyword.contains('.') {
                        return Err(syntax_error(
                            tok.line,
                            format!("illegal enum value name '{keyword}'"),
                        ));
                    }
                    self.expect_symbol('=')?;
                    let id = self.expect_enum_value()?;
                    let options = self.parse_field_options()?;
                    self.expect_symbol(';')?;
                    def.values.push(EnumValueDef {
                        name: keyword,
                        id,
                        options,
                    });
                }
            }
        }

        Ok(def)
    }

    fn expect_enum_value(&mut self) -> Result<i32, ParseError> {
        let mut tok = self.lexer.next_token()?;
        let negative = tok.token == Token::Symbol('-');
        if negative {
            tok = self.lexer.next_token()?;
        }
        match tok.token {
            Token::Int(n) => {
                let value = if negative { -(n as i128) } else { n as i128 };
                i32::try_from(value).map_err(|_| {
                    syntax_error(tok.line, format!("enum value {value} out of range"))
                })
            }
            other => Err(syntax_error(
                tok.line,
                format!("expected enum value, found {other}"),
            )),
        }
    }

    // ---- services ----

    fn parse_service(&mut self, line: usize) -> Result<ServiceDef, ParseError> {
        let name = self.expect_name()?;
        let mut def = ServiceDef {
            name,
            methods: Vec::new(),
            options: Options::new(),
            line,
        };
        self.expect_symbol('{')?;

        loop {
            let tok = self.lexer.next_token()?;
            let keyword = match &tok.token {
                Token::Symbol('}') => break,
                Token::Symbol(';') => continue,
                Token::Ident(kw) => kw.clone(),
                other => {
                    return Err(syntax_error(
                        tok.line,
                        format!("unexpected {other} in service '{}'", def.name),
                    ))
                }
            };

            match keyword.as_str() {
                "option" => {
                    let (name, value) = self.parse_option_assignment()?;
                    self.expect_symbol(';')?;
                    def.options.insert(name, value);
                }
                "rpc" => def.methods.push(self.parse_rpc()?),
                _ => {
                    return Err(syntax_error(
                        tok.line,
                        format!("unexpected '{keyword}' in service '{}'", def.name),
                    ))
                }
            }
        }

        Ok(def)
    }

    fn parse_rpc(&mut self) -> Result<MethodDef, ParseError> {
        let name = self.expect_name()?;
        self.expect_symbol('(')?;
        let (request_stream, request) = self.parse_rpc_type()?;
        self.expect_symbol(')')?;
        self.expect_keyword("returns")?;
        self.expect_symbol('(')?;
        let (response_stream, response) = self.parse_rpc_type()?;
        self.expect_symbol(')')?;

        let mut options = Options::new();
        let tok = self.lexer.next_token()?;
        match &tok.token {
            Token::Symbol(';') => {}
            Token::Symbol('{') => loop {
                let tok = self.lexer.next_token()?;
                match &tok.token {
                    Token::Symbol('}') => break,
                    Token::Symbol(';') => continue,
                    Token::Ident(kw) if kw == "option" => {
                        let (opt, value) = self.parse_option_assignment()?;
                        self.expect_symbol(';')?;
                        options.insert(opt, value);
                    }
                    other => {
                        return Err(syntax_error(
                            tok.line,
                            format!("unexpected {other} in rpc '{name}'"),
                        ))
                    }
                }
            },
            other => {
                return Err(syntax_error(
                    tok.line,
                    format!("expected ';' or '{{' after rpc '{name}', found {other}"),
                ))
            }
        }

        Ok(MethodDef {
            name,
            request,
            response,
            request_stream,
            response_stream,
            options,
        })
    }

    /// `Type` or `stream Type`. A message literally named `stream` is still accepted.
    fn parse_rpc_type(&mut self) -> Result<(bool, String), ParseError> {
        let first = self.expect_path()?;
        if first == "stream" {
            if let Token::Ident(_) = self.lexer.peek_token()?.token {
                return Ok((true, self.expect_path()?));
            }
        }
        Ok((false, first))
    }

    // ---- extend ----

    fn parse_extend(&mut self, line: usize) -> Result<ExtendDef, ParseError> {
        let extendee = self.expect_path()?;
        let mut def = ExtendDef {
            extendee,
            fields: Vec::new(),
            messages: Vec::new(),
            line,
        };
        self.expect_symbol('{')?;

        loop {
            let tok = self.lexer.next_token()?;
            let keyword = match &tok.token {
                Token::Symbol('}') => break,
                Token::Symbol(';') => continue,
                Token::Ident(kw) => kw.clone(),
                other => {
                    return Err(syntax_error(
                        tok.line,
                        format!("unexpected {other} in extend '{}'", def.extendee),
                    ))
                }
            };

            let (field, group) = match keyword.as_str() {
                "required" | "optional" | "repeated" => {
                    self.parse_field(Some(rule_keyword(&keyword)), None, tok.line)?
                }
                _ => {
                    let line = tok.line;
                    self.lexer.push_back(tok);
                    self.parse_field(None, None, line)?
                }
            };
            def.fields.push(field);
            def.messages.extend(group);
        }

        Ok(def)
    }

    // ---- options and constants ----

    fn parse_option_name(&mut self) -> Result<String, ParseError> {
        let tok = self.lexer.next_token()?;
        let mut name = match &tok.token {
            Token::Ident(s) => s.clone(),
            Token::Symbol('(') => {
                let inner = self.expect_path()?;
                self.expect_symbol(')')?;
                format!("({inner})")
            }
            other => {
                return Err(syntax_error(
                    tok.line,
                    format!("expected option name, found {other}"),
                ))
            }
        };

        // (my.ext).field.sub lexes as a dotted identifier after the parenthesis
        loop {
            let next = self.lexer.peek_token()?;
            match next.token {
                Token::Ident(ref s) if s.starts_with('.') => {
                    self.lexer.next_token()?;
                    name.push_str(s);
                }
                _ => break,
            }
        }
        Ok(name)
    }

    fn parse_option_assignment(&mut self) -> Result<(String, Constant), ParseError> {
        let name = self.parse_option_name()?;
        self.expect_symbol('=')?;
        let value = self.parse_constant()?;
        Ok((name, value))
    }

    /// `[name = value, ...]` after a field or enum value, if present.
    fn parse_field_options(&mut self) -> Result<Options, ParseError> {
        let mut options = Options::new();
        if !self.consume_symbol('[')? {
            return Ok(options);
        }
        loop {
            let (name, value) = self.parse_option_assignment()?;
            options.insert(name, value);
            let tok = self.lexer.next_token()?;
            match tok.token {
                Token::Symbol(',') => continue,
                Token::Symbol(']') => break,
                other => {
                    return Err(syntax_error(
                        tok.line,
                        format!("expected ',' or ']', found {other}"),
                    ))
                }
            }
        }
        Ok(options)
    }

    fn parse_constant(&mut self) -> Result<Constant, ParseError> {
        let tok = self.lexer.next_token()?;
        match tok.token {
            Token::Ident(s) => Ok(match s.as_str() {
                "true" => Constant::Bool(true),
                "false" => Constant::Bool(false),
                "inf" => Constant::Float(f64::INFINITY),
                "nan" => Constant::Float(f64::NAN),
                _ => Constant::Ident(s),
            }),
            Token::Int(n) => int_constant(n, false, tok.line),
            Token::Float(v) => Ok(Constant::Float(v)),
            Token::Str(mut value) => {
                while let Token::Str(next) = self.lexer.peek_token()?.token {
                    self.lexer.next_token()?;
                    value.push_str(&next);
                }
                Ok(Constant::Str(value))
            }
            Token::Symbol(sign @ ('-' | '+')) => {
                let negative = sign == '-';
                let inner = self.lexer.next_token()?;
                match inner.token {
                    Token::Int(n) => int_constant(n, negative, inner.line),
                    Token::Float(v) => Ok(Constant::Float(if negative { -v } else { v })),
                    Token::Ident(ref s) if s == "inf" => Ok(Constant::Float(if negative {
                        f64::NEG_INFINITY
                    } else {
                        f64::INFINITY
                    })),
                    Token::Ident(ref s) if s == "nan" => Ok(Constant::Float(f64::NAN)),
                    other => Err(syntax_error(
                        inner.line,
                        format!("expected a number after '{sign}', found {other}"),
                    )),
                }
            }
            Token::Symbol('{') => self.nested(Self::parse_aggregate),
            other => Err(syntax_error(
                tok.line,
                format!("expected a constant, found {other}"),
            )),
        }
    }

    /// Text-format aggregate body after the opening `{`.
    fn parse_aggregate(&mut self) -> Result<Constant, ParseError> {
        let mut fields = Vec::new();
        loop {
            let tok = self.lexer.next_token()?;
            let key = match &tok.token {
                Token::Symbol('}') => break,
                Token::Symbol(',') | Token::Symbol(';') => continue,
                Token::Ident(s) => s.clone(),
                Token::Symbol('[') => {
                    let inner = self.expect_path()?;
                    self.expect_symbol(']')?;
                    format!("[{inner}]")
                }
                other => {
                    return Err(syntax_error(
                        tok.line,
                        format!("expected a field name in aggregate value, found {other}"),
                    ))
                }
            };

            let has_colon = self.consume_symbol(':')?;
            if self.consume_symbol('{')? {
                fields.push((key, self.nested(Self::parse_aggregate)?));
            } else if has_colon && self.consume_symbol('[')? {
                while !self.consume_symbol(']')? {
                    let value = self.parse_constant()?;
                    fields.push((key.clone(), value));
                    self.consume_symbol(',')?;
                }
            } else if has_colon {
                fields.push((key, self.parse_constant()?));
            } else {
                return Err(syntax_error(
                    tok.line,
                    format!("expected ':' or '{{' after '{key}'"),
                ));
            }
        }
        Ok(Constant::Aggregate(fields))
    }

    // ---- token helpers ----

    fn skip_statement(&mut self) -> Result<(), ParseError> {
        loop {
            let tok = self.lexer.next_token()?;
            match tok.token {
                Token::Symbol(';') => return Ok(()),
                Token::Eof => return Err(syntax_error(tok.line, "expected ';', found end of input")),
                _ => {}
            }
        }
    }

    fn expect_symbol(&mut self, c: char) -> Result<(), ParseError> {
        let tok = self.lexer.next_token()?;
        if tok.token == Token::Symbol(c) {
            Ok(())
        } else {
            Err(syntax_error(
                tok.line,
                format!("expected '{c}', found {}", tok.token),
            ))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        let tok = self.lexer.next_token()?;
        match &tok.token {
            Token::Ident(s) if s == keyword => Ok(()),
            other => Err(syntax_error(
                tok.line,
                format!("expected '{keyword}', found {other}"),
            )),
        }
    }

    /// A possibly dotted identifier, e.g. a type reference.
    fn expect_path(&mut self) -> Result<String, ParseError> {
        let tok = self.lexer.next_token()?;
        match tok.token {
            Token::Ident(s) => Ok(s),
            other => Err(syntax_error(
                tok.line,
                format!("expected identifier, found {other}"),
            )),
        }
    }

    /// A simple identifier, e.g. the name being declared.
    fn expect_name(&mut self) -> Result<String, ParseError> {
        let line = self.lexer.current_line();
        let name = self.expect_path()?;
        if name.contains('.') {
            return Err(syntax_error(line, format!("illegal name '{name}'")));
        }
        Ok(name)
    }

    fn expect_string(&mut self) -> Result<String, ParseError> {
        let tok = self.lexer.next_token()?;
        match tok.token {
            Token::Str(s) => Ok(s),
            other => Err(syntax_error(
                tok.line,
                format!("expected string literal, found {other}"),
            )),
        }
    }

    fn expect_field_id(&mut self) -> Result<u32, ParseError> {
        let tok = self.lexer.next_token()?;
        match tok.token {
            Token::Int(n) => u32::try_from(n)
                .map_err(|_| syntax_error(tok.line, format!("field id {n} out of range"))),
            other => Err(syntax_error(
                tok.line,
                format!("expected field id, found {other}"),
            )),
        }
    }

    fn next_is_symbol(&mut self, c: char) -> Result<bool, ParseError> {
        Ok(self.lexer.peek_token()?.token == Token::Symbol(c))
    }

    fn consume_symbol(&mut self, c: char) -> Result<bool, ParseError> {
        if self.next_is_symbol(c)? {
            self.lexer.next_token()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn consume_ident(&mut self, keyword: &str) -> Result<bool, ParseError> {
        let tok = self.lexer.peek_token()?;
        if matches!(&tok.token, Token::Ident(s) if s == keyword) {
            self.lexer.next_token()?;
            return Ok(true);
        }
        Ok(false)
    }
}

fn rule_keyword(keyword: &str) -> Rule {
    match keyword {
        "required" => Rule::Required,
        "repeated" => Rule::Repeated,
        _ => Rule::Optional,
    }
}

fn push_field(msg: &mut MessageDef, (field, group): (FieldDef, Option<MessageDef>)) {
    msg.fields.push(field);
    msg.messages.extend(group);
}

fn int_constant(n: u64, negative: bool, line: usize) -> Result<Constant, ParseError> {
    if negative {
        let value = -(n as i128);
        return i64::try_from(value)
            .map(Constant::Int)
            .map_err(|_| syntax_error(line, format!("integer -{n} out of range")));
    }
    Ok(match i64::try_from(n) {
        Ok(v) => Constant::Int(v),
        Err(_) => Constant::Uint(n),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_proto2_message() {
        let file = parse_schema(
            r#"
            package test;
            message Person {
                required string name = 1;
                optional int32 id = 2 [default = -1];
                repeated string email = 3;
            }
            "#,
        )
        .unwrap();

        assert_eq!(file.syntax, Syntax::Proto2);
        assert_eq!(file.package.as_deref(), Some("test"));
        let person = &file.messages[0];
        assert_eq!(person.name, "Person");
        assert_eq!(person.fields.len(), 3);
        assert_eq!(person.fields[0].rule, Rule::Required);
        assert_eq!(person.fields[1].options.get("default"), Some(&Constant::Int(-1)));
        assert_eq!(person.fields[2].rule, Rule::Repeated);
    }

    #[test]
    fn test_proto3_implicit_rule() {
        let file = parse_schema("syntax = \"proto3\"; message A { int32 x = 1; optional int32 y = 2; }").unwrap();
        assert_eq!(file.syntax, Syntax::Proto3);
        assert_eq!(file.messages[0].fields[0].rule, Rule::Implicit);
        assert_eq!(file.messages[0].fields[1].rule, Rule::Optional);
    }

    #[test]
    fn test_proto2_missing_rule_is_error() {
        let err = parse_schema("message A {\n int32 x = 1;\n}").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 2, .. }));
    }

    #[test]
    fn test_proto3_required_is_error() {
        let err = parse_schema("syntax = \"proto3\";\nmessage A {\n required int32 x = 1; }").unwrap_err();
        assert_eq!(err.line(), 3);
    }

    #[test]
    fn test_group() {
        let file = parse_schema(
            "message S { repeated group Result = 1 { required string url = 2; } }",
        )
        .unwrap();
        let msg = &file.messages[0];
        assert_eq!(msg.fields[0].name, "result");
        assert_eq!(msg.fields[0].type_name, "Result");
        assert!(msg.messages[0].is_group);
        assert_eq!(msg.messages[0].fields[0].name, "url");
    }

    #[test]
    fn test_map_and_oneof() {
        let file = parse_schema(
            r#"
            syntax = "proto3";
            message M {
                map<string, int32> counts = 1;
                oneof choice {
                    string a = 2;
                    int32 b = 3;
                }
            }
            "#,
        )
        .unwrap();
        let msg = &file.messages[0];
        assert_eq!(msg.fields[0].rule, Rule::Map);
        assert_eq!(msg.fields[0].key_type.as_deref(), Some("string"));
        assert_eq!(msg.fields[0].type_name, "int32");
        assert_eq!(msg.oneofs[0].name, "choice");
        assert_eq!(msg.fields[1].oneof.as_deref(), Some("choice"));
        assert_eq!(msg.fields[1].rule, Rule::Optional);
    }

    #[test]
    fn test_enum_negative_and_options() {
        let file = parse_schema(
            "enum E { option allow_alias = true; A = 0; B = -2 [deprecated = true]; C = 0; }",
        )
        .unwrap();
        let e = &file.enums[0];
        assert_eq!(e.values.len(), 3);
        assert_eq!(e.values[1].id, -2);
        assert_eq!(e.options.get("allow_alias"), Some(&Constant::Bool(true)));
    }

    #[test]
    fn test_service() {
        let file = parse_schema(
            r#"
            service Greeter {
                rpc Hello (Req) returns (Resp);
                rpc Chat (stream Req) returns (stream Resp) { option deadline = 1.5; }
            }
            "#,
        )
        .unwrap();
        let svc = &file.services[0];
        assert_eq!(svc.methods.len(), 2);
        assert!(!svc.methods[0].request_stream);
        assert!(svc.methods[1].request_stream);
        assert!(svc.methods[1].response_stream);
        assert_eq!(svc.methods[1].options.get("deadline"), Some(&Constant::Float(1.5)));
    }

    #[test]
    fn test_extensions_and_extend() {
        let file = parse_schema(
            r#"
            message Base { extensions 100 to 199, 500 to max; reserved 5, 8 to 9; reserved "old"; }
            extend Base { optional int32 extra = 100; }
            "#,
        )
        .unwrap();
        assert_eq!(file.messages[0].extensions, vec![(100, 199), (500, ID_MAX)]);
        assert_eq!(file.messages[0].reserved.len(), 3);
        assert_eq!(file.extends[0].extendee, "Base");
        assert_eq!(file.extends[0].fields[0].id, 100);
    }

    #[test]
    fn test_custom_and_aggregate_options() {
        let file = parse_schema(
            r#"
            option (my.opt).sub = "a" "b";
            option java_package = "x";
            message M { option (rule) = { min: 1 nested { flag: true } list: [1, 2] }; }
            "#,
        )
        .unwrap();
        assert_eq!(file.options.get("(my.opt).sub"), Some(&Constant::Str("ab".into())));
        let rule = file.messages[0].options.get("(rule)").unwrap();
        assert_eq!(
            rule,
            &Constant::Aggregate(vec![
                ("min".into(), Constant::Int(1)),
                (
                    "nested".into(),
                    Constant::Aggregate(vec![("flag".into(), Constant::Bool(true))])
                ),
                ("list".into(), Constant::Int(1)),
                ("list".into(), Constant::Int(2)),
            ])
        );
    }

    #[test]
    fn test_imports() {
        let file = parse_schema("import \"a.proto\"; import public \"b.proto\"; import weak \"c.proto\";").unwrap();
        assert_eq!(file.imports, vec!["a.proto", "b.proto", "c.proto"]);
    }

    #[test]
    fn test_error_line_numbers() {
        let err = parse_schema("message A {\n\n  optional int32 = 1;\n}").unwrap_err();
        assert_eq!(err.line(), 3);
    }

    #[test]
    fn test_nesting_limit() {
        let nest = |depth: usize| format!("{}{}", "message M { ".repeat(depth), "}".repeat(depth));
        assert!(parse_schema(&nest(MAX_NESTING)).is_ok());

        let err = parse_schema(&nest(100_000)).unwrap_err();
        assert!(matches!(err, ParseError::Syntax { ref message, .. } if message.contains("nesting")));

        let deep_option = format!("option o = {}{};", "{a ".repeat(10_000), "}".repeat(10_000));
        assert!(matches!(
            parse_schema(&deep_option),
            Err(ParseError::Syntax { .. })
        ));
    }
}
