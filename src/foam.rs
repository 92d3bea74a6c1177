//! OpenFOAM polyMesh and cell field reader
//!
//! Every polyMesh file is a `FoamFile { ... }` dictionary followed by a
//! count-prefixed list:
//!
//! ```text
//! 4
//! (
//! (0 0 0)
//! ...
//! )
//! ```
//!
//! Lists may also be written compactly on one line (`3(0 1 2)`). Faces are
//! lists of vertex labels; only the first four of each face are kept.
//!
//! Per-timestep cell fields hold either scalars (`p`) or vectors (`U`).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use bstr::ByteSlice;
use tracing::{info, warn};

use crate::buffer::GrowableBuffer;
use crate::case::Timestep;
use crate::error::{FoamError, Result};
use crate::tokenize::{self, parse_index, Token};

/// Most vertices kept per face
pub const MAX_FACE_VERTICES: usize = 4;

/// Faces as read from `faces`, padded to four labels
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FaceList {
    pub faces: GrowableBuffer<u32, 4>,
    /// Vertex count of each face after truncation (3 or 4)
    pub arity: Vec<u8>,
    /// Faces that had more than four vertices
    pub truncated: usize,
}

/// Value type of a cell field
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Scalar,
    Vector,
}

impl FieldKind {
    /// Components per cell
    pub fn width(self) -> usize {
        match self {
            FieldKind::Scalar => 1,
            FieldKind::Vector => 3,
        }
    }

    /// Kind named by a header `class` such as `volScalarField`; `None` when
    /// the class is not a field class at all
    fn from_class(class: &[u8]) -> Result<Option<FieldKind>> {
        let lower = class.to_ascii_lowercase();
        if lower.ends_with(b"scalarfield") {
            Ok(Some(FieldKind::Scalar))
        } else if lower.ends_with(b"vectorfield") {
            Ok(Some(FieldKind::Vector))
        } else if lower.ends_with(b"field") {
            Err(FoamError::UnsupportedFormat(format!(
                "{} files are not supported, only scalar and vector fields",
                class.to_str_lossy()
            )))
        } else {
            Ok(None)
        }
    }

    fn from_list_tag(tag: &Token<'_>) -> Result<FieldKind> {
        match tag.text {
            b"List<scalar>" => Ok(FieldKind::Scalar),
            b"List<vector>" => Ok(FieldKind::Vector),
            other => Err(FoamError::UnsupportedFormat(format!(
                "{} on line {}, only List<scalar> and List<vector> are supported",
                other.to_str_lossy(),
                tag.line
            ))),
        }
    }
}

/// Values of one timestep's cell field, one row per cell
#[derive(Clone, Debug, PartialEq)]
pub enum CellField {
    Scalar(GrowableBuffer<f64, 1>),
    Vector(GrowableBuffer<f64, 3>),
}

impl CellField {
    pub fn kind(&self) -> FieldKind {
        match self {
            CellField::Scalar(_) => FieldKind::Scalar,
            CellField::Vector(_) => FieldKind::Vector,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CellField::Scalar(rows) => rows.len(),
            CellField::Vector(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Components of cell `index`
    pub fn cell(&self, index: usize) -> Option<&[f64]> {
        match self {
            CellField::Scalar(rows) => rows.rows().get(index).map(|row| &row[..]),
            CellField::Vector(rows) => rows.rows().get(index).map(|row| &row[..]),
        }
    }
}

/// Surface mesh and cell fields of one case
///
/// Topology is checked once in [`FoamMesh::from_parts`] and is read-only
/// afterwards, so face and cell labels always resolve.
#[derive(Clone, Debug, Default)]
pub struct FoamMesh {
    vertices: GrowableBuffer<f64, 3>,
    faces: GrowableBuffer<u32, 4>,
    face_arity: Vec<u8>,
    /// Two triangles per face
    face_vertex_indices: GrowableBuffer<u32, 6>,
    owner: Vec<u32>,
    /// Present only for internal faces
    neighbour: Vec<u32>,
    magnitude_by_timestep: BTreeMap<Timestep, CellField>,
}

impl FoamMesh {
    /// Load `points`, `faces`, `owner` and `neighbour` from a polyMesh directory
    pub fn load(poly_mesh_dir: &Path) -> Result<FoamMesh> {
        let vertices = read_points(&poly_mesh_dir.join("points"))?;
        let faces = read_faces(&poly_mesh_dir.join("faces"))?;
        let owner = read_labels(&poly_mesh_dir.join("owner"))?;

        let neighbour_path = poly_mesh_dir.join("neighbour");
        let neighbour = if neighbour_path.exists() {
            read_labels(&neighbour_path)?
        } else {
            warn!(path = %neighbour_path.display(), "no neighbour file, treating every face as boundary");
            Vec::new()
        };

        let mesh = FoamMesh::from_parts(vertices, faces, owner, neighbour)?;
        info!(
            vertices = mesh.vertices().len(),
            faces = mesh.face_count(),
            cells = mesh.cell_count(),
            "loaded polyMesh"
        );
        Ok(mesh)
    }

    /// Assemble a mesh from already parsed lists, checking cross references
    pub fn from_parts(
        vertices: GrowableBuffer<f64, 3>,
        faces: FaceList,
        owner: Vec<u32>,
        neighbour: Vec<u32>,
    ) -> Result<FoamMesh> {
        let face_count = faces.faces.len();
        if faces.arity.len() != face_count {
            return Err(FoamError::UnsupportedFormat(format!(
                "{} face sizes for {} faces",
                faces.arity.len(),
                face_count
            )));
        }
        if owner.len() < face_count {
            return Err(FoamError::UnsupportedFormat(format!(
                "owner lists {} faces, mesh has {}",
                owner.len(),
                face_count
            )));
        }
        if neighbour.len() > face_count {
            return Err(FoamError::UnsupportedFormat(format!(
                "neighbour lists {} faces, mesh has {}",
                neighbour.len(),
                face_count
            )));
        }
        if let Some(bad) = faces.faces.flat().find(|&v| v as usize >= vertices.len()) {
            return Err(FoamError::UnsupportedFormat(format!(
                "face references vertex {} of {}",
                bad,
                vertices.len()
            )));
        }
        // every cell owns at least one face
        if let Some(bad) = owner
            .iter()
            .chain(&neighbour)
            .find(|&&cell| cell as usize >= face_count)
        {
            return Err(FoamError::UnsupportedFormat(format!(
                "cell label {} in a mesh of {} faces",
                bad, face_count
            )));
        }

        let face_vertex_indices = triangulate(&faces.faces);

        Ok(FoamMesh {
            vertices,
            faces: faces.faces,
            face_arity: faces.arity,
            face_vertex_indices,
            owner,
            neighbour,
            magnitude_by_timestep: BTreeMap::new(),
        })
    }

    pub fn vertices(&self) -> &GrowableBuffer<f64, 3> {
        &self.vertices
    }

    /// Two triangles per face: `(a, b, c)` and `(a, c, d)`
    pub fn face_vertex_indices(&self) -> &GrowableBuffer<u32, 6> {
        &self.face_vertex_indices
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Number of cells referenced by owner and neighbour
    pub fn cell_count(&self) -> usize {
        self.owner
            .iter()
            .chain(self.neighbour.iter())
            .max()
            .map_or(0, |&max| max as usize + 1)
    }

    /// Vertex labels of face `index`, without padding
    pub fn face(&self, index: usize) -> Result<&[u32]> {
        let row = self.faces.at(index)?;
        let arity = self.face_arity[index] as usize;
        Ok(&row[..arity])
    }

    /// Cell that owns a face
    pub fn owner_of(&self, face: usize) -> Option<u32> {
        self.owner.get(face).copied()
    }

    /// Cell on the other side of an internal face
    pub fn neighbour_of(&self, face: usize) -> Option<u32> {
        self.neighbour.get(face).copied()
    }

    /// Read a cell field file such as `<timestep>/U` and store it under
    /// `timestep`; returns the row count
    pub fn load_timestep_field(&mut self, timestep: Timestep, path: &Path) -> Result<usize> {
        let field = read_cell_field(path, self.cell_count())?;
        let rows = field.len();
        self.insert_field(timestep, field);
        Ok(rows)
    }

    /// Store `field` under `timestep`, replacing any earlier one
    ///
    /// A field shorter than the cell count is kept; the missing cells render black.
    pub fn insert_field(&mut self, timestep: Timestep, field: CellField) {
        self.magnitude_by_timestep.insert(timestep, field);
    }

    pub fn field(&self, timestep: &Timestep) -> Option<&CellField> {
        self.magnitude_by_timestep.get(timestep)
    }

    pub fn field_count(&self) -> usize {
        self.magnitude_by_timestep.len()
    }

    /// Multiply every vertex by `factor`
    pub fn scale(&mut self, factor: f64) {
        self.vertices.scale(factor);
    }
}

/// Uniformly scale a mesh in place
pub fn scale_mesh(mesh: &mut FoamMesh, factor: f64) {
    mesh.scale(factor);
}

/// Split each padded face into the triangles (a,b,c) and (a,c,d)
///
/// Padded triangles give a degenerate second triangle.
fn triangulate(faces: &GrowableBuffer<u32, 4>) -> GrowableBuffer<u32, 6> {
    faces
        .iter()
        .map(|&[a, b, c, d]| [a, b, c, a, c, d])
        .collect()
}

/// An OpenFOAM file with comments removed
struct FoamText {
    lines: Vec<Vec<u8>>,
}

impl FoamText {
    fn open(path: &Path) -> Result<FoamText> {
        let bytes = fs::read(path).map_err(|e| FoamError::unavailable(path, e))?;
        Ok(FoamText {
            lines: strip_comments(&bytes),
        })
    }

    /// Tokens after the `FoamFile` header; parentheses become their own tokens
    fn body_tokens(&self) -> Result<Vec<Token<'_>>> {
        Ok(self.classed_tokens()?.1)
    }

    /// The header's `class` entry, if any, and the body tokens
    fn classed_tokens(&self) -> Result<(Option<&[u8]>, Vec<Token<'_>>)> {
        let tokens = foam_tokens(&self.lines);
        let start = skip_header(&tokens)?;
        let class = header_entry(&tokens[..start], b"class");
        Ok((class, tokens[start..].to_vec()))
    }
}

/// Drop `//` and `/* */` comments, keeping line structure for error positions
fn strip_comments(bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    let mut current = Vec::new();
    let mut in_block = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();
        if b == b'\n' {
            if current.last() == Some(&b'\r') {
                current.pop();
            }
            lines.push(std::mem::take(&mut current));
        } else if in_block {
            if b == b'*' && next == Some(b'/') {
                in_block = false;
                i += 1;
            }
        } else if b == b'/' && next == Some(b'*') {
            in_block = true;
            i += 1;
        } else if b == b'/' && next == Some(b'/') {
            while i + 1 < bytes.len() && bytes[i + 1] != b'\n' {
                i += 1;
            }
        } else {
            current.push(b);
        }
        i += 1;
    }
    if !current.is_empty() {
        lines.push(current);
    }

    lines
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'(' | b')' | b'{' | b'}')
}

/// Whitespace tokens with `( ) { }` split out and `;` dropped
fn foam_tokens(lines: &[Vec<u8>]) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        for word in tokenize::split_tokens(line) {
            let mut start = 0;
            for (pos, &b) in word.iter().enumerate() {
                if is_delimiter(b) || b == b';' {
                    if start < pos {
                        tokens.push(Token {
                            text: &word[start..pos],
                            line: index + 1,
                        });
                    }
                    if b != b';' {
                        tokens.push(Token {
                            text: &word[pos..pos + 1],
                            line: index + 1,
                        });
                    }
                    start = pos + 1;
                }
            }
            if start < word.len() {
                tokens.push(Token {
                    text: &word[start..],
                    line: index + 1,
                });
            }
        }
    }

    tokens
}

/// Index of the first token after the `FoamFile { ... }` dictionary
fn skip_header(tokens: &[Token<'_>]) -> Result<usize> {
    let Some(start) = tokens.iter().position(|t| t.text == b"FoamFile") else {
        return Ok(0);
    };

    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(start + 1) {
        match token.text {
            b"{" => depth += 1,
            b"}" => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    check_ascii(&tokens[start..i])?;
                    return Ok(i + 1);
                }
            }
            _ => {}
        }
    }

    Err(FoamError::UnsupportedFormat(
        "unterminated FoamFile header".to_string(),
    ))
}

fn header_entry<'a>(header: &[Token<'a>], key: &[u8]) -> Option<&'a [u8]> {
    header
        .windows(2)
        .find(|pair| pair[0].text == key)
        .map(|pair| pair[1].text)
}

fn check_ascii(header: &[Token<'_>]) -> Result<()> {
    match header_entry(header, b"format") {
        Some(f) if f != b"ascii" => Err(FoamError::UnsupportedFormat(format!(
            "{} format, only ascii is supported",
            f.to_str_lossy()
        ))),
        _ => Ok(()),
    }
}

fn is_count(token: &Token<'_>) -> Option<usize> {
    token.text.to_str().ok()?.parse().ok()
}

/// Locate `<count> ( ... )` at or after `from`; returns the count and the body
/// between the parentheses. A list cut off before its `)` yields what is there.
fn counted_list<'a, 'b>(tokens: &'b [Token<'a>], from: usize) -> Result<(usize, &'b [Token<'a>])> {
    let (count_at, declared) = tokens
        .iter()
        .enumerate()
        .skip(from)
        .find_map(|(i, t)| is_count(t).map(|n| (i, n)))
        .ok_or_else(|| FoamError::UnsupportedFormat("missing list count".to_string()))?;

    let open = count_at + 1;
    match tokens.get(open) {
        Some(t) if t.text == b"(" => {}
        Some(t) => return Err(tokenize::numeric_error(t)),
        None => return Ok((declared, &[])),
    }

    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token.text {
            b"(" => depth += 1,
            b")" => {
                depth -= 1;
                if depth == 0 {
                    return Ok((declared, &tokens[open + 1..i]));
                }
            }
            _ => {}
        }
    }

    Ok((declared, &tokens[open + 1..]))
}

fn without_parens<'a>(tokens: &[Token<'a>]) -> Vec<Token<'a>> {
    tokens
        .iter()
        .filter(|t| t.text != b"(" && t.text != b")")
        .copied()
        .collect()
}

/// Read `constant/polyMesh/points`
pub fn read_points(path: &Path) -> Result<GrowableBuffer<f64, 3>> {
    let text = FoamText::open(path)?;
    let tokens = text.body_tokens()?;
    let (declared, body) = counted_list(&tokens, 0)?;
    let rows = tokenize::partition_rows::<3>(&without_parens(body), declared)?;
    Ok(rows.into_iter().collect())
}

/// Read `constant/polyMesh/faces`, keeping at most four labels per face
pub fn read_faces(path: &Path) -> Result<FaceList> {
    let text = FoamText::open(path)?;
    let tokens = text.body_tokens()?;
    let (declared, body) = counted_list(&tokens, 0)?;
    let list = parse_faces(body, declared)?;

    if list.truncated > 0 {
        warn!(
            path = %path.display(),
            faces = list.truncated,
            "faces with more than {} vertices truncated",
            MAX_FACE_VERTICES
        );
    }
    Ok(list)
}

fn parse_faces(body: &[Token<'_>], declared: usize) -> Result<FaceList> {
    let mut list = FaceList::default();
    list.faces.reserve(declared.min(body.len()));
    let mut pos = 0;

    while list.faces.len() < declared && pos < body.len() {
        let count = parse_index(&body[pos])? as usize;
        // count "(" labels... ")"
        let Some(labels) = body.get(pos + 2..pos + 2 + count) else {
            break;
        };
        if body[pos + 1].text != b"(" {
            return Err(tokenize::numeric_error(&body[pos + 1]));
        }
        if count < 3 {
            return Err(FoamError::UnsupportedFormat(format!(
                "face on line {} has {} vertices",
                body[pos].line, count
            )));
        }

        let kept = count.min(MAX_FACE_VERTICES);
        let mut row = [0u32; 4];
        for (slot, token) in row.iter_mut().zip(&labels[..kept]) {
            *slot = parse_index(token)?;
        }
        for k in kept..MAX_FACE_VERTICES {
            row[k] = row[kept - 1];
        }
        if count > MAX_FACE_VERTICES {
            list.truncated += 1;
        }

        list.faces.append(row);
        list.arity.push(kept as u8);
        // skip the closing ")"
        pos += 3 + count;
    }

    Ok(list)
}

/// Read a label list such as `owner` or `neighbour`
pub fn read_labels(path: &Path) -> Result<Vec<u32>> {
    let text = FoamText::open(path)?;
    let tokens = text.body_tokens()?;
    let (declared, body) = counted_list(&tokens, 0)?;
    body.iter().take(declared).map(parse_index).collect()
}

/// Read the `internalField` of a cell field file such as `<timestep>/U`
///
/// Scalars are stored one per row and vectors three per row. The kind comes
/// from the value (`List<scalar>`, `List<vector>`, a bare number or a
/// parenthesized triple) and must agree with a field `class` in the header.
/// A `uniform` value is expanded to `cell_count` rows.
pub fn read_cell_field(path: &Path, cell_count: usize) -> Result<CellField> {
    let text = FoamText::open(path)?;
    let (class, tokens) = text.classed_tokens()?;
    let declared = class.map(FieldKind::from_class).transpose()?.flatten();

    let at = tokens
        .iter()
        .position(|t| t.text == b"internalField")
        .ok_or_else(|| FoamError::UnsupportedFormat("missing internalField".to_string()))?;

    let field = match tokens.get(at + 1).map(|t| t.text) {
        Some(b"uniform") => uniform_field(&tokens[at + 2..], cell_count)?,
        Some(b"nonuniform") => nonuniform_field(&tokens, at + 2)?,
        _ => {
            return Err(FoamError::UnsupportedFormat(
                "internalField is neither uniform nor nonuniform".to_string(),
            ));
        }
    };

    match declared {
        Some(kind) if kind != field.kind() => Err(FoamError::UnsupportedFormat(format!(
            "{} holds {:?} values",
            class.unwrap_or_default().to_str_lossy(),
            field.kind()
        ))),
        _ => Ok(field),
    }
}

fn uniform_field(value: &[Token<'_>], cell_count: usize) -> Result<CellField> {
    match value.first() {
        Some(open) if open.text == b"(" => {
            if value.len() < 5 || value[4].text != b")" {
                return Err(FoamError::UnsupportedFormat(format!(
                    "uniform value on line {} is not a vector",
                    open.line
                )));
            }
            let row = [
                tokenize::parse_f64(&value[1])?,
                tokenize::parse_f64(&value[2])?,
                tokenize::parse_f64(&value[3])?,
            ];
            Ok(CellField::Vector(std::iter::repeat_n(row, cell_count).collect()))
        }
        Some(token) => {
            let value = tokenize::parse_f64(token)?;
            Ok(CellField::Scalar(std::iter::repeat_n([value], cell_count).collect()))
        }
        None => Err(FoamError::UnsupportedFormat(
            "uniform internalField has no value".to_string(),
        )),
    }
}

/// `List<scalar> n ( ... )` or `List<vector> n ( (x y z) ... )` starting at `at`
fn nonuniform_field(tokens: &[Token<'_>], at: usize) -> Result<CellField> {
    let tag = tokens.get(at).ok_or_else(|| {
        FoamError::UnsupportedFormat("nonuniform internalField has no list type".to_string())
    })?;
    let kind = FieldKind::from_list_tag(tag)?;
    let (declared, body) = counted_list(tokens, at + 1)?;
    let values = without_parens(body);

    Ok(match kind {
        FieldKind::Scalar => CellField::Scalar(
            tokenize::partition_rows::<1>(&values, declared)?
                .into_iter()
                .collect(),
        ),
        FieldKind::Vector => CellField::Vector(
            tokenize::partition_rows::<3>(&values, declared)?
                .into_iter()
                .collect(),
        ),
    })
}
