//! Filter matching and update application over plain documents.

use std::cmp::Ordering;

use bson::{Bson, Document};

use emotes_common::{AppError, AppResult};

/// Values reachable at a dotted path. Arrays along the way are traversed; a
/// terminal array yields itself followed by its elements.
pub(crate) fn resolve(doc: &Document, path: &str) -> Vec<Bson> {
    let mut out = Vec::new();
    let segments: Vec<&str> = path.split('.').collect();
    resolve_in(&Bson::Document(doc.clone()), &segments, &mut out);
    out
}

fn resolve_in(value: &Bson, segments: &[&str], out: &mut Vec<Bson>) {
    let Some((head, rest)) = segments.split_first() else {
        if let Bson::Array(items) = value {
            out.push(value.clone());
            out.extend(items.iter().cloned());
        } else {
            out.push(value.clone());
        }
        return;
    };

    match value {
        Bson::Document(d) => {
            if let Some(v) = d.get(*head) {
                resolve_in(v, rest, out);
            }
        }
        Bson::Array(items) => {
            if let Ok(i) = head.parse::<usize>() {
                if let Some(v) = items.get(i) {
                    resolve_in(v, rest, out);
                }
                return;
            }
            for item in items {
                if matches!(item, Bson::Document(_)) {
                    resolve_in(item, segments, out);
                }
            }
        }
        _ => {}
    }
}

/// First value at a dotted path without array expansion of the terminal.
pub(crate) fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for seg in segments {
        current = match current {
            Bson::Document(d) => d.get(seg)?,
            Bson::Array(items) => items.get(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn as_f64(v: &Bson) -> Option<f64> {
    match v {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Compare two values of a comparable type.
pub(crate) fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Equality with numeric widening.
pub(crate) fn equals(a: &Bson, b: &Bson) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
        _ => a == b,
    }
}

/// Sort order used by `$sort`: missing and null first.
pub(crate) fn sort_cmp(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
    }
}

fn is_operator_doc(d: &Document) -> bool {
    !d.is_empty() && d.keys().all(|k| k.starts_with('$'))
}

/// Whether `doc` satisfies `filter`.
pub(crate) fn matches(doc: &Document, filter: &Document) -> AppResult<bool> {
    for (key, cond) in filter {
        let ok = match key.as_str() {
            "$and" => all_of(doc, cond)?,
            "$or" => any_of(doc, cond)?,
            "$nor" => !any_of(doc, cond)?,
            op if op.starts_with('$') => {
                return Err(AppError::internal(format!(
                    "memory store does not evaluate {op}"
                )));
            }
            path => field_matches(doc, path, cond)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sub_filters(cond: &Bson) -> AppResult<Vec<&Document>> {
    match cond {
        Bson::Array(items) => items
            .iter()
            .map(|b| match b {
                Bson::Document(d) => Ok(d),
                other => Err(AppError::internal(format!("bad logical clause {other}"))),
            })
            .collect(),
        other => Err(AppError::internal(format!("bad logical clause {other}"))),
    }
}

fn all_of(doc: &Document, cond: &Bson) -> AppResult<bool> {
    for f in sub_filters(cond)? {
        if !matches(doc, f)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn any_of(doc: &Document, cond: &Bson) -> AppResult<bool> {
    for f in sub_filters(cond)? {
        if matches(doc, f)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn field_matches(doc: &Document, path: &str, cond: &Bson) -> AppResult<bool> {
    let candidates = resolve(doc, path);
    match cond {
        Bson::Document(ops) if is_operator_doc(ops) => {
            for (op, arg) in ops {
                if !operator_holds(doc, path, &candidates, op, arg)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Bson::Null => Ok(candidates.is_empty() || candidates.iter().any(|c| *c == Bson::Null)),
        value => Ok(candidates.iter().any(|c| equals(c, value))),
    }
}

fn array_arg<'a>(op: &str, arg: &'a Bson) -> AppResult<&'a Vec<Bson>> {
    match arg {
        Bson::Array(items) => Ok(items),
        other => Err(AppError::internal(format!("{op} needs an array, got {other}"))),
    }
}

fn operator_holds(
    doc: &Document,
    path: &str,
    candidates: &[Bson],
    op: &str,
    arg: &Bson,
) -> AppResult<bool> {
    let any_cmp = |pred: fn(Ordering) -> bool| {
        candidates
            .iter()
            .any(|c| compare(c, arg).is_some_and(pred))
    };

    Ok(match op {
        "$eq" => candidates.iter().any(|c| equals(c, arg)),
        "$ne" => !candidates.iter().any(|c| equals(c, arg)),
        "$in" => {
            let set = array_arg(op, arg)?;
            candidates.iter().any(|c| set.iter().any(|v| equals(c, v)))
                || (candidates.is_empty() && set.contains(&Bson::Null))
        }
        "$nin" => {
            let set = array_arg(op, arg)?;
            !candidates.iter().any(|c| set.iter().any(|v| equals(c, v)))
        }
        "$gt" => any_cmp(Ordering::is_gt),
        "$gte" => any_cmp(Ordering::is_ge),
        "$lt" => any_cmp(Ordering::is_lt),
        "$lte" => any_cmp(Ordering::is_le),
        "$exists" => !candidates.is_empty() == matches!(arg, Bson::Boolean(true)),
        "$size" => match get_path(doc, path) {
            Some(Bson::Array(items)) => as_f64(arg).is_some_and(|n| items.len() as f64 == n),
            _ => false,
        },
        "$elemMatch" => {
            let Bson::Document(sub) = arg else {
                return Err(AppError::internal("$elemMatch needs a document"));
            };
            match get_path(doc, path) {
                Some(Bson::Array(items)) => {
                    let mut hit = false;
                    for item in items {
                        if element_matches(item, sub)? {
                            hit = true;
                            break;
                        }
                    }
                    hit
                }
                _ => false,
            }
        }
        "$not" => {
            let Bson::Document(sub) = arg else {
                return Err(AppError::internal("$not needs a document"));
            };
            let mut all = true;
            for (inner, inner_arg) in sub {
                all &= operator_holds(doc, path, candidates, inner, inner_arg)?;
            }
            !all
        }
        other => {
            return Err(AppError::internal(format!(
                "memory store does not evaluate {other}"
            )));
        }
    })
}

/// Match one array element against a condition: a sub-filter for documents,
/// an operator document for scalars, or plain equality.
pub(crate) fn element_matches(item: &Bson, cond: &Document) -> AppResult<bool> {
    if is_operator_doc(cond) && !cond.contains_key("$or") && !cond.contains_key("$and") {
        let candidates = [item.clone()];
        let wrapper = Document::new();
        for (op, arg) in cond {
            if !operator_holds(&wrapper, "", &candidates, op, arg)? {
                return Ok(false);
            }
        }
        return Ok(true);
    }
    match item {
        Bson::Document(d) => matches(d, cond),
        _ => Ok(false),
    }
}

/// Walk to the container holding the last segment, creating documents on the way.
fn walk_mut<'a>(value: &'a mut Bson, segments: &[&str]) -> AppResult<&'a mut Bson> {
    let Some((head, rest)) = segments.split_first() else {
        return Ok(value);
    };
    let next = match value {
        Bson::Document(d) => {
            if !d.contains_key(*head) {
                d.insert(*head, Document::new());
            }
            d.get_mut(*head)
                .ok_or_else(|| AppError::internal(format!("missing field {head}")))?
        }
        Bson::Array(items) => {
            let i: usize = head
                .parse()
                .map_err(|_| AppError::internal(format!("non-numeric array index {head}")))?;
            items
                .get_mut(i)
                .ok_or_else(|| AppError::internal(format!("array index {i} out of range")))?
        }
        other => {
            return Err(AppError::internal(format!(
                "cannot traverse {other} at {head}"
            )));
        }
    };
    walk_mut(next, rest)
}

fn split_path(path: &str) -> AppResult<(Vec<&str>, &str)> {
    let mut segments: Vec<&str> = path.split('.').collect();
    let last = segments
        .pop()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::internal("empty update path"))?;
    Ok((segments, last))
}

fn set_path(root: &mut Bson, path: &str, value: Bson) -> AppResult<()> {
    let (parents, last) = split_path(path)?;
    match walk_mut(root, &parents)? {
        Bson::Document(d) => {
            d.insert(last, value);
            Ok(())
        }
        Bson::Array(items) => {
            let i: usize = last
                .parse()
                .map_err(|_| AppError::internal(format!("non-numeric array index {last}")))?;
            let slot = items
                .get_mut(i)
                .ok_or_else(|| AppError::internal(format!("array index {i} out of range")))?;
            *slot = value;
            Ok(())
        }
        other => Err(AppError::internal(format!("cannot set {path} on {other}"))),
    }
}

fn unset_path(root: &mut Bson, path: &str) -> AppResult<()> {
    let (parents, last) = split_path(path)?;
    match walk_mut(root, &parents)? {
        Bson::Document(d) => {
            d.remove(last);
        }
        Bson::Array(items) => {
            if let Some(slot) = last.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                *slot = Bson::Null;
            }
        }
        _ => {}
    }
    Ok(())
}

fn array_at<'a>(root: &'a mut Bson, path: &str) -> AppResult<&'a mut Vec<Bson>> {
    let (parents, last) = split_path(path)?;
    let Bson::Document(parent) = walk_mut(root, &parents)? else {
        return Err(AppError::internal(format!("{path} has no document parent")));
    };
    if !matches!(parent.get(last), Some(Bson::Array(_))) {
        parent.insert(last, Bson::Array(Vec::new()));
    }
    match parent.get_mut(last) {
        Some(Bson::Array(items)) => Ok(items),
        _ => Err(AppError::internal(format!("{path} is not an array"))),
    }
}

fn each_values(value: &Bson) -> Vec<Bson> {
    match value {
        Bson::Document(d) if d.contains_key("$each") => match d.get("$each") {
            Some(Bson::Array(items)) => items.clone(),
            _ => Vec::new(),
        },
        other => vec![other.clone()],
    }
}

fn operand<'a>(update: &'a Document, op: &str) -> AppResult<Option<&'a Document>> {
    match update.get(op) {
        None => Ok(None),
        Some(Bson::Document(d)) => Ok(Some(d)),
        Some(other) => Err(AppError::internal(format!("{op} needs a document, got {other}"))),
    }
}

/// Apply an update document (`$set`, `$unset`, `$addToSet`, `$push`, `$pull`).
pub(crate) fn apply_update(doc: &mut Document, update: &Document) -> AppResult<()> {
    for key in update.keys() {
        if !matches!(
            key.as_str(),
            "$set" | "$unset" | "$addToSet" | "$push" | "$pull" | "$inc"
        ) {
            return Err(AppError::internal(format!("unsupported update operator {key}")));
        }
    }

    let mut root = Bson::Document(std::mem::take(doc));
    let result = apply_on_root(&mut root, update);
    if let Bson::Document(d) = root {
        *doc = d;
    }
    result
}

fn apply_on_root(root: &mut Bson, update: &Document) -> AppResult<()> {
    if let Some(set) = operand(update, "$set")? {
        for (path, value) in set {
            set_path(root, path, value.clone())?;
        }
    }
    if let Some(inc) = operand(update, "$inc")? {
        for (path, by) in inc {
            let current = match root {
                Bson::Document(d) => get_path(d, path).cloned(),
                _ => None,
            };
            let next = match (current, by) {
                (Some(Bson::Int32(a)), Bson::Int32(b)) => Bson::Int32(a + b),
                (Some(Bson::Int64(a)), b) => Bson::Int64(a + as_f64(b).unwrap_or(0.0) as i64),
                (Some(Bson::Int32(a)), b) => Bson::Int64(i64::from(a) + as_f64(b).unwrap_or(0.0) as i64),
                (_, b) => b.clone(),
            };
            set_path(root, path, next)?;
        }
    }
    if let Some(unset) = operand(update, "$unset")? {
        for path in unset.keys() {
            unset_path(root, path)?;
        }
    }
    if let Some(add) = operand(update, "$addToSet")? {
        for (path, value) in add {
            let items = array_at(root, path)?;
            for v in each_values(value) {
                if !items.iter().any(|x| equals(x, &v)) {
                    items.push(v);
                }
            }
        }
    }
    if let Some(push) = operand(update, "$push")? {
        for (path, value) in push {
            array_at(root, path)?.extend(each_values(value));
        }
    }
    if let Some(pull) = operand(update, "$pull")? {
        for (path, cond) in pull {
            let items = array_at(root, path)?;
            let mut kept = Vec::with_capacity(items.len());
            for item in items.drain(..) {
                let remove = match cond {
                    Bson::Document(c) => element_matches(&item, c)?,
                    value => equals(&item, value),
                };
                if !remove {
                    kept.push(item);
                }
            }
            *items = kept;
        }
    }
    Ok(())
}
