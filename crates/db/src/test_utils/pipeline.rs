//! Evaluation of simple pipeline stages over in-memory documents.

use std::collections::HashMap;

use bson::{Bson, Document, doc};

use emotes_common::{AppError, AppResult};

use super::filter::{equals, get_path, matches, resolve, sort_cmp};
use crate::aggregations::Stage;
use crate::store::Collection;

/// Read access to other collections for `$lookup`.
pub(crate) type Tables = HashMap<Collection, Vec<Document>>;

fn expression(doc: &Document, expr: &Bson) -> AppResult<Bson> {
    match expr {
        Bson::String(s) if s == "$$ROOT" => Ok(Bson::Document(doc.clone())),
        Bson::String(s) if s.starts_with("$$") => {
            Err(AppError::internal(format!("memory store does not bind {s}")))
        }
        Bson::String(s) if s.starts_with('$') => {
            Ok(get_path(doc, &s[1..]).cloned().unwrap_or(Bson::Null))
        }
        Bson::Document(d) if d.keys().any(|k| k.starts_with('$')) => Err(AppError::internal(
            format!("memory store does not evaluate expression {d}"),
        )),
        other => Ok(other.clone()),
    }
}

fn lookup(
    input: Vec<Document>,
    tables: &Tables,
    from: Collection,
    local_field: &str,
    foreign_field: &str,
    as_field: &str,
) -> Vec<Document> {
    let foreign = tables.get(&from).map(Vec::as_slice).unwrap_or_default();
    input
        .into_iter()
        .map(|mut d| {
            let locals: Vec<Bson> = resolve(&d, local_field)
                .into_iter()
                .filter(|b| !matches!(b, Bson::Array(_)))
                .collect();
            let joined: Vec<Bson> = foreign
                .iter()
                .filter(|f| {
                    resolve(f, foreign_field)
                        .iter()
                        .any(|v| locals.iter().any(|l| equals(l, v)))
                })
                .cloned()
                .map(Bson::Document)
                .collect();
            d.insert(as_field, joined);
            d
        })
        .collect()
}

fn unwind(input: Vec<Document>, path: &str, preserve: bool) -> Vec<Document> {
    let mut out = Vec::new();
    for d in input {
        match get_path(&d, path).cloned() {
            Some(Bson::Array(items)) if !items.is_empty() => {
                for item in items {
                    let mut copy = d.clone();
                    copy.insert(path, item);
                    out.push(copy);
                }
            }
            Some(Bson::Array(_)) | None | Some(Bson::Null) => {
                if preserve {
                    let mut copy = d;
                    copy.remove(path);
                    out.push(copy);
                }
            }
            Some(_) => out.push(d),
        }
    }
    out
}

fn group(input: Vec<Document>, spec: &Document) -> AppResult<Vec<Document>> {
    let key_expr = spec.get("_id").cloned().unwrap_or(Bson::Null);
    let mut order: Vec<Bson> = Vec::new();
    let mut groups: Vec<Vec<Document>> = Vec::new();

    for d in input {
        let key = expression(&d, &key_expr)?;
        if let Some(i) = order.iter().position(|k| equals(k, &key)) {
            groups[i].push(d);
        } else {
            order.push(key);
            groups.push(vec![d]);
        }
    }
    if groups.is_empty() && key_expr == Bson::Null {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    for (key, members) in order.into_iter().zip(groups) {
        let mut row = doc! { "_id": key };
        for (field, acc) in spec.iter().filter(|(k, _)| k.as_str() != "_id") {
            let Bson::Document(acc) = acc else {
                return Err(AppError::internal(format!("bad accumulator for {field}")));
            };
            let Some((op, arg)) = acc.iter().next() else {
                return Err(AppError::internal(format!("empty accumulator for {field}")));
            };
            let value = match op.as_str() {
                "$push" => Bson::Array(
                    members
                        .iter()
                        .map(|m| expression(m, arg))
                        .collect::<AppResult<_>>()?,
                ),
                "$addToSet" => {
                    let mut set: Vec<Bson> = Vec::new();
                    for m in &members {
                        let v = expression(m, arg)?;
                        if !set.iter().any(|x| equals(x, &v)) {
                            set.push(v);
                        }
                    }
                    Bson::Array(set)
                }
                "$first" => members
                    .first()
                    .map(|m| expression(m, arg))
                    .transpose()?
                    .unwrap_or(Bson::Null),
                "$sum" => {
                    let mut total = 0_i64;
                    for m in &members {
                        total += match expression(m, arg)? {
                            Bson::Int32(n) => i64::from(n),
                            Bson::Int64(n) => n,
                            _ => 0,
                        };
                    }
                    Bson::Int64(total)
                }
                other => {
                    return Err(AppError::internal(format!(
                        "memory store does not evaluate accumulator {other}"
                    )));
                }
            };
            row.insert(field, value);
        }
        out.push(row);
    }
    Ok(out)
}

fn project(input: Vec<Document>, spec: &Document) -> AppResult<Vec<Document>> {
    input
        .into_iter()
        .map(|d| {
            let mut out = Document::new();
            let keep_id = !matches!(spec.get("_id"), Some(Bson::Int32(0) | Bson::Boolean(false)));
            if let Some(id) = d.get("_id").filter(|_| keep_id) {
                out.insert("_id", id.clone());
            }
            for (field, how) in spec.iter().filter(|(k, _)| k.as_str() != "_id") {
                match how {
                    Bson::Int32(0) | Bson::Int64(0) | Bson::Boolean(false) => {}
                    Bson::Int32(_) | Bson::Int64(_) | Bson::Boolean(true) => {
                        if let Some(v) = get_path(&d, field) {
                            out.insert(field, v.clone());
                        }
                    }
                    expr => {
                        out.insert(field, expression(&d, expr)?);
                    }
                }
            }
            Ok(out)
        })
        .collect()
}

/// Run `pipeline` over `input`.
pub(crate) fn run(
    mut input: Vec<Document>,
    pipeline: &[Stage],
    tables: &Tables,
) -> AppResult<Vec<Document>> {
    for stage in pipeline {
        input = match stage {
            Stage::Match(filter) => {
                let mut kept = Vec::with_capacity(input.len());
                for d in input {
                    if matches(&d, filter)? {
                        kept.push(d);
                    }
                }
                kept
            }
            Stage::Lookup {
                from,
                local_field,
                foreign_field,
                as_field,
            } => lookup(input, tables, *from, local_field, foreign_field, as_field),
            Stage::Unwind {
                path,
                preserve_null_and_empty,
            } => unwind(input, path, *preserve_null_and_empty),
            Stage::Sort(keys) => {
                input.sort_by(|a, b| {
                    for (k, dir) in keys {
                        let ord = sort_cmp(get_path(a, k), get_path(b, k));
                        let ord = if matches!(dir, Bson::Int32(-1) | Bson::Int64(-1)) {
                            ord.reverse()
                        } else {
                            ord
                        };
                        if ord.is_ne() {
                            return ord;
                        }
                    }
                    std::cmp::Ordering::Equal
                });
                input
            }
            Stage::Skip(n) => input
                .into_iter()
                .skip(usize::try_from(*n).unwrap_or(usize::MAX))
                .collect(),
            Stage::Limit(n) => input
                .into_iter()
                .take(usize::try_from(*n).unwrap_or(0))
                .collect(),
            Stage::Count(field) => {
                let n = i64::try_from(input.len()).unwrap_or(i64::MAX);
                if n == 0 {
                    Vec::new()
                } else {
                    let mut row = Document::new();
                    row.insert(field.clone(), n);
                    vec![row]
                }
            }
            Stage::Group(spec) => group(input, spec)?,
            Stage::Project(spec) => project(input, spec)?,
            Stage::Set(fields) => input
                .into_iter()
                .map(|mut d| {
                    for (k, v) in fields {
                        let value = expression(&d, v)?;
                        d.insert(k, value);
                    }
                    Ok(d)
                })
                .collect::<AppResult<_>>()?,
            Stage::Unset(fields) => input
                .into_iter()
                .map(|mut d| {
                    for f in fields {
                        d.remove(f);
                    }
                    d
                })
                .collect(),
            Stage::ReplaceRoot(expr) => input
                .into_iter()
                .map(|d| match expression(&d, expr)? {
                    Bson::Document(root) => Ok(root),
                    other => Err(AppError::internal(format!("newRoot is not a document: {other}"))),
                })
                .collect::<AppResult<_>>()?,
            Stage::LookupPipeline { .. } => {
                return Err(AppError::internal(
                    "memory store does not evaluate pipeline lookups; script the result",
                ));
            }
        };
    }
    Ok(input)
}
