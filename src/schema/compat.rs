//! Writer/reader compatibility.
//!
//! [`check_compatibility`] is the static half of schema resolution: it
//! rejects pairs that can never decode (kind mismatch, renamed record, fixed
//! size change, reader-only field without default).  Enum symbols and union
//! branches depend on the data actually written, so those are checked by
//! the decoder record by record.

use std::collections::HashSet;

use super::{resolve, Name, Names, Schema};
use crate::error::{Error, Result};

/// Check that data written with `writer` can be read as `reader`.
pub fn check_compatibility(writer: &Schema, reader: &Schema) -> Result<()> {
    let wn = writer.names();
    let rn = reader.names();
    let mut seen = HashSet::new();
    check(writer, reader, &wn, &rn, &mut seen)
}

/// Safe widening from a writer primitive to a reader primitive.
pub(crate) fn promotes(writer: &Schema, reader: &Schema) -> bool {
    matches!(
        (writer, reader),
        (Schema::Int, Schema::Long | Schema::Float | Schema::Double)
            | (Schema::Long, Schema::Float | Schema::Double)
            | (Schema::Float, Schema::Double)
            | (Schema::String, Schema::Bytes)
            | (Schema::Bytes, Schema::String)
    )
}

/// Named types match on full name, unqualified name, or a reader alias.
pub(crate) fn names_match(writer: &Name, reader: &Name, reader_aliases: &[String]) -> bool {
    writer.fullname() == reader.fullname()
        || writer.name() == reader.name()
        || reader_aliases.iter().any(|a| *a == writer.fullname() || *a == writer.name())
}

fn check(
    writer: &Schema,
    reader: &Schema,
    wn:     &Names,
    rn:     &Names,
    seen:   &mut HashSet<(String, String)>,
) -> Result<()> {
    let w = resolve(writer, wn)?;
    let r = resolve(reader, rn)?;
    match (w, r) {
        (Schema::Union(wu), _) => {
            // Only the branches actually written matter; one readable branch
            // is enough to attempt decoding.
            if wu.variants().iter().any(|b| check(b, r, wn, rn, seen).is_ok()) {
                Ok(())
            } else {
                Err(incompatible(w, r))
            }
        }
        (_, Schema::Union(ru)) => {
            if ru.variants().iter().any(|b| check(w, b, wn, rn, seen).is_ok()) {
                Ok(())
            } else {
                Err(Error::UnresolvableUnion { writer: w.describe(), reader: r.to_string() })
            }
        }
        (Schema::Record(wr), Schema::Record(rr)) => {
            if !names_match(wr.name(), rr.name(), rr.aliases()) {
                return Err(incompatible(w, r));
            }
            if !seen.insert((wr.name().fullname(), rr.name().fullname())) {
                return Ok(());
            }
            for rf in rr.fields() {
                let wf = wr.fields().iter().find(|wf| {
                    wf.name() == rf.name() || rf.aliases().iter().any(|a| a == wf.name())
                });
                match wf {
                    Some(wf) => check(wf.schema(), rf.schema(), wn, rn, seen).map_err(|e| match e {
                        Error::IncompatibleSchema(m) => {
                            Error::IncompatibleSchema(format!("field '{}': {m}", rf.name()))
                        }
                        other => other,
                    })?,
                    None if rf.default().is_some() => {}
                    None => {
                        return Err(Error::MissingDefault {
                            record: rr.name().fullname(),
                            field:  rf.name().to_owned(),
                        })
                    }
                }
            }
            Ok(())
        }
        (Schema::Enum(we), Schema::Enum(re)) if names_match(we.name(), re.name(), re.aliases()) => Ok(()),
        (Schema::Fixed(wf), Schema::Fixed(rf))
            if names_match(wf.name(), rf.name(), rf.aliases()) && wf.size() == rf.size() => Ok(()),
        (Schema::Array(wi), Schema::Array(ri)) => check(wi, ri, wn, rn, seen),
        (Schema::Map(wv), Schema::Map(rv)) => check(wv, rv, wn, rn, seen),
        (w, r) if w.kind() == r.kind() && w.name().is_none() => Ok(()),
        (w, r) if promotes(w, r) => Ok(()),
        (w, r) => Err(incompatible(w, r)),
    }
}

fn incompatible(w: &Schema, r: &Schema) -> Error {
    Error::IncompatibleSchema(format!("writer {} cannot be read as {}", w.describe(), r.describe()))
}
