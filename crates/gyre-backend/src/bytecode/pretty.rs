//! Pretty-printing for lowered programs
//!
//! Provides a human-readable disassembly for debugging and the CLI.

use super::{BasicBlock, LoweredBody};
use crate::model::{Function, Program, Type};
use std::fmt::Write;

/// Trait for pretty-printing lowered constructs
pub trait PrettyPrint {
    fn pretty_print(&self) -> String;
}

impl PrettyPrint for BasicBlock {
    fn pretty_print(&self) -> String {
        let mut output = String::new();
        writeln!(output, "  block {}:", self.id.0).unwrap();
        for inst in &self.instructions {
            writeln!(output, "    {}", inst).unwrap();
        }
        output
    }
}

impl PrettyPrint for LoweredBody {
    fn pretty_print(&self) -> String {
        let mut output = String::new();
        if !self.locals.is_empty() {
            let locals: Vec<String> = self
                .locals
                .iter()
                .map(|l| format!("{}@{}", l.name, l.slot))
                .collect();
            writeln!(output, "  ; locals: {}", locals.join(", ")).unwrap();
        }
        for block in &self.blocks {
            output.push_str(&block.pretty_print());
        }
        output
    }
}

impl PrettyPrint for Program {
    fn pretty_print(&self) -> String {
        let mut output = String::new();

        for class in &self.classes {
            write!(output, "; class {} {}", class.id.0, class.name).unwrap();
            if let Some(supertype) = &class.supertype {
                write!(output, " : {}", type_name(self, &Type::Class(supertype.clone()))).unwrap();
            }
            writeln!(output).unwrap();
            if let Some(layout) = &class.layout {
                for (i, field) in layout.fields.iter().enumerate() {
                    let defn = self.defn(field.defn);
                    writeln!(
                        output,
                        ";   field {} {}: {} ({:?})",
                        i,
                        defn.name,
                        type_name(self, &defn.ty),
                        field.repr
                    ).unwrap();
                }
                for (i, method) in layout.methods.iter().enumerate() {
                    let f = self.function(method.function);
                    writeln!(output, ";   method {} {} -> fn {}", i, f.name, f.id.0).unwrap();
                }
            }
        }
        writeln!(output).unwrap();

        for function in &self.functions {
            if let Some(body) = &function.lowered {
                writeln!(output, "{} {{", signature(self, function)).unwrap();
                output.push_str(&body.pretty_print());
                writeln!(output, "}}").unwrap();
                writeln!(output).unwrap();
            }
        }

        if !self.strings.is_empty() {
            writeln!(output, "; strings").unwrap();
            for (i, s) in self.strings.iter().enumerate() {
                writeln!(output, ";   {} {:?}", i, s).unwrap();
            }
        }
        output
    }
}

fn signature(program: &Program, function: &Function) -> String {
    let params: Vec<String> = function
        .params
        .iter()
        .map(|p| {
            let defn = program.defn(*p);
            format!("{}: {}", defn.name, type_name(program, &defn.ty))
        })
        .collect();
    let mut sig = format!("function {} {}", function.id.0, function.name);
    if !function.type_params.is_empty() {
        let names: Vec<&str> = function
            .type_params
            .iter()
            .map(|t| program.type_params[t.index()].name.as_str())
            .collect();
        write!(sig, "[{}]", names.join(", ")).unwrap();
    }
    write!(
        sig,
        "({}) -> {}",
        params.join(", "),
        type_name(program, &function.return_type)
    ).unwrap();
    sig
}

/// Render a type with class and type parameter names.
pub(crate) fn type_name(program: &Program, ty: &Type) -> String {
    match ty {
        Type::Class(ct) => {
            let mut name = program.class(ct.class).name.clone();
            if !ct.args.is_empty() {
                let args: Vec<String> = ct.args.iter().map(|a| type_name(program, a)).collect();
                write!(name, "[{}]", args.join(", ")).unwrap();
            }
            if ct.nullable {
                name.push('?');
            }
            name
        }
        Type::Variable(id) => program.type_params[id.index()].name.clone(),
        other => other.to_string(),
    }
}
