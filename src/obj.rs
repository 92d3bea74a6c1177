//! Reduced Wavefront OBJ reader for decorative geometry
//!
//! Understands `v`, `vt`, `vn`, `f` and the `o`/`g` name records. Face
//! indices are 1-based in the file and stored 0-based.

use std::io::BufRead;
use std::path::Path;

use bstr::ByteSlice;

use crate::buffer::GrowableBuffer;
use crate::error::{FoamError, Result};
use crate::foam::MAX_FACE_VERTICES;
use crate::input::{read_all_lines, read_file_lines};
use crate::tokenize::{self, split_tokens, Token};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjMesh {
    pub vertices: GrowableBuffer<f64, 3>,
    pub tex_coords: GrowableBuffer<f64, 2>,
    pub normals: GrowableBuffer<f64, 3>,
    /// Vertex indices per face, padded to four by repeating the last one
    pub indices: GrowableBuffer<u32, 4>,
    pub tex_indices: GrowableBuffer<u32, 4>,
    pub normal_indices: GrowableBuffer<u32, 4>,
    pub label: Option<String>,
}

impl ObjMesh {
    /// Multiply every vertex by `factor`
    pub fn scale(&mut self, factor: f64) {
        self.vertices.scale(factor);
    }
}

/// Parse an OBJ file
pub fn parse_wavefront_mesh(path: &Path) -> Result<ObjMesh> {
    parse_lines(&read_file_lines(path)?)
}

/// Parse OBJ text from any buffered reader
pub fn parse_wavefront_reader<R: BufRead>(reader: R) -> Result<ObjMesh> {
    parse_lines(&read_all_lines(reader)?)
}

fn parse_lines(lines: &[Vec<u8>]) -> Result<ObjMesh> {
    let mut mesh = ObjMesh::default();

    for (index, line) in lines.iter().enumerate() {
        let tokens: Vec<Token<'_>> = split_tokens(line)
            .map(|text| Token {
                text,
                line: index + 1,
            })
            .collect();
        let Some((record, args)) = tokens.split_first() else {
            continue;
        };

        match record.text {
            b"v" => mesh.vertices.append(floats::<3>(record, args)?),
            b"vt" => mesh.tex_coords.append(floats::<2>(record, args)?),
            b"vn" => mesh.normals.append(floats::<3>(record, args)?),
            b"f" => {
                let face = parse_face(record, args)?;
                mesh.indices.append(face.vertices);
                if let Some(tex) = face.tex {
                    mesh.tex_indices.append(tex);
                }
                if let Some(normal) = face.normal {
                    mesh.normal_indices.append(normal);
                }
            }
            b"o" | b"g" if mesh.label.is_none() => {
                let name: Vec<&[u8]> = args.iter().map(|t| t.text).collect();
                mesh.label = Some(name.join(&b' ').to_str_lossy().into_owned());
            }
            _ => {}
        }
    }

    Ok(mesh)
}

fn floats<const W: usize>(record: &Token<'_>, args: &[Token<'_>]) -> Result<[f64; W]> {
    if args.len() < W {
        return Err(FoamError::UnsupportedFormat(format!(
            "'{}' record on line {} needs {} values",
            record.text.to_str_lossy(),
            record.line,
            W
        )));
    }
    let mut row = [0.0; W];
    for (slot, token) in row.iter_mut().zip(args) {
        *slot = tokenize::parse_f64(token)?;
    }
    Ok(row)
}

struct ObjFace {
    vertices: [u32; 4],
    tex: Option<[u32; 4]>,
    normal: Option<[u32; 4]>,
}

/// `f a b c [d]` where each corner is `v`, `v/t`, `v//n` or `v/t/n`
fn parse_face(record: &Token<'_>, args: &[Token<'_>]) -> Result<ObjFace> {
    if args.len() < 3 {
        return Err(FoamError::UnsupportedFormat(format!(
            "face on line {} has {} vertices",
            record.line,
            args.len()
        )));
    }

    let corners = &args[..args.len().min(MAX_FACE_VERTICES)];
    let mut vertices = Vec::with_capacity(4);
    let mut tex = Vec::with_capacity(4);
    let mut normal = Vec::with_capacity(4);

    for corner in corners {
        let mut parts = corner.text.split(|&b| b == b'/');
        let one_based = |part: Option<&[u8]>| -> Result<Option<u32>> {
            match part {
                None | Some(b"") => Ok(None),
                Some(text) => {
                    let token = Token {
                        text,
                        line: corner.line,
                    };
                    match tokenize::parse_index(&token)? {
                        0 => Err(tokenize::numeric_error(&token)),
                        n => Ok(Some(n - 1)),
                    }
                }
            }
        };

        let v = one_based(parts.next())?.ok_or_else(|| tokenize::numeric_error(corner))?;
        vertices.push(v);
        if let Some(t) = one_based(parts.next())? {
            tex.push(t);
        }
        if let Some(n) = one_based(parts.next())? {
            normal.push(n);
        }
    }

    Ok(ObjFace {
        vertices: pad(&vertices),
        tex: (tex.len() == vertices.len()).then(|| pad(&tex)),
        normal: (normal.len() == vertices.len()).then(|| pad(&normal)),
    })
}

fn pad(indices: &[u32]) -> [u32; 4] {
    let mut row = [0; 4];
    for (k, slot) in row.iter_mut().enumerate() {
        *slot = indices[k.min(indices.len() - 1)];
    }
    row
}
