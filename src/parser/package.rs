//! Package Reader Module
//!
//! XLSXパッケージ（ZIPアーカイブ）内のXMLを直接読み、calamineでは取得できない情報を抽出する。
//! シートの表示状態、1904年エポック、文書プロパティ、描画オブジェクトに埋め込まれた画像が対象です。

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use std::sync::Arc;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::ZipArchive;

use crate::error::XlsxRagError;
use crate::security::SecurityConfig;
use crate::types::CellCoord;
use crate::workbook::{DocumentProperties, SheetImage};

const WORKBOOK_PATH: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PATH: &str = "xl/_rels/workbook.xml.rels";
const CORE_PROPERTIES_PATH: &str = "docProps/core.xml";

/// `xl/workbook.xml` に記載されたシート
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SheetEntry {
    pub name: String,
    pub hidden: bool,
    /// ワークブックリレーションシップID（`r:id`）
    rel_id: Option<String>,
}

/// パッケージから読み取った情報
#[derive(Debug, Clone, Default)]
pub(crate) struct PackageInfo {
    /// シート（ワークブック順）
    pub sheets: Vec<SheetEntry>,
    /// 1904年エポックを使用するか
    pub is_1904: bool,
    /// 文書プロパティ（ファイル名は含まない）
    pub properties: DocumentProperties,
    /// シート名 -> 埋め込み画像（アンカー順）
    pub images: HashMap<String, Vec<SheetImage>>,
}

impl PackageInfo {
    /// パッケージのバイト列を解析
    ///
    /// # 戻り値
    ///
    /// * `Ok(PackageInfo)` - 解析に成功した場合
    /// * `Err(XlsxRagError::Zip)` - ZIPアーカイブとして読めない場合
    /// * `Err(XlsxRagError::SecurityViolation)` - パッケージが上限を超える場合
    /// * `Err(XlsxRagError::Xml)` - XMLが不正な場合
    pub fn read(bytes: &[u8], security: &SecurityConfig) -> Result<Self, XlsxRagError> {
        let mut archive =
            ZipArchive::new(Cursor::new(bytes)).map_err(|e| XlsxRagError::Zip(e.to_string()))?;
        security.check_archive(&mut archive)?;

        // 1. xl/workbook.xml
        let (sheets, is_1904) = match read_entry(&mut archive, WORKBOOK_PATH)? {
            Some(xml) => parse_workbook(&xml)?,
            None => (Vec::new(), false),
        };

        // 2. docProps/core.xml
        let properties = match read_entry(&mut archive, CORE_PROPERTIES_PATH)? {
            Some(xml) => parse_core_properties(&xml)?,
            None => DocumentProperties::default(),
        };

        // 3. シート -> 描画 -> 画像
        let workbook_rels = match read_entry(&mut archive, WORKBOOK_RELS_PATH)? {
            Some(xml) => parse_relationships(&xml)?,
            None => HashMap::new(),
        };
        let mut images = HashMap::new();
        for sheet in &sheets {
            let Some(rel) = sheet.rel_id.as_ref().and_then(|id| workbook_rels.get(id)) else {
                continue;
            };
            let sheet_path = resolve_target("xl", &rel.target);
            let sheet_images = read_sheet_images(&mut archive, &sheet_path)?;
            if !sheet_images.is_empty() {
                images.insert(sheet.name.clone(), sheet_images);
            }
        }

        Ok(Self {
            sheets,
            is_1904,
            properties,
            images,
        })
    }

    /// シートが非表示かどうか（不明な場合は表示扱い）
    pub fn is_hidden(&self, sheet_name: &str) -> bool {
        self.sheets
            .iter()
            .any(|s| s.name == sheet_name && s.hidden)
    }
}

/// リレーションシップ
#[derive(Debug, Clone, PartialEq, Eq)]
struct Relationship {
    target: String,
    kind: String,
    external: bool,
}

/// アーカイブからエントリを読み込む（存在しない場合は`None`）
fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
) -> Result<Option<Vec<u8>>, XlsxRagError> {
    let mut file = match archive.by_name(path) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(XlsxRagError::Zip(e.to_string())),
    };
    let mut content = Vec::new();
    file.read_to_end(&mut content)?;
    Ok(Some(content))
}

fn xml_error(e: impl std::fmt::Display) -> XlsxRagError {
    XlsxRagError::Xml(e.to_string())
}

/// 要素の属性をローカル名で取得
fn attribute(e: &BytesStart<'_>, local_name: &[u8]) -> Result<Option<String>, XlsxRagError> {
    for attr in e.attributes() {
        let attr = attr.map_err(xml_error)?;
        if attr.key.local_name().as_ref() == local_name {
            let raw = std::str::from_utf8(&attr.value)?;
            let value = quick_xml::escape::unescape(raw).map_err(xml_error)?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// `xl/workbook.xml` を解析（シート一覧と1904年エポック）
fn parse_workbook(xml: &[u8]) -> Result<(Vec<SheetEntry>, bool), XlsxRagError> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut sheets = Vec::new();
    let mut is_1904 = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"workbookPr" => {
                    if let Some(value) = attribute(&e, b"date1904")? {
                        is_1904 = value == "1" || value == "true";
                    }
                }
                b"sheet" => {
                    if let Some(name) = attribute(&e, b"name")? {
                        let state = attribute(&e, b"state")?;
                        sheets.push(SheetEntry {
                            name,
                            hidden: matches!(state.as_deref(), Some("hidden") | Some("veryHidden")),
                            rel_id: attribute(&e, b"id")?,
                        });
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok((sheets, is_1904))
}

/// `docProps/core.xml` を解析（タイトルと作成者）
fn parse_core_properties(xml: &[u8]) -> Result<DocumentProperties, XlsxRagError> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut properties = DocumentProperties::default();
    let mut current: Option<&'static str> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                current = match e.local_name().as_ref() {
                    b"title" => Some("title"),
                    b"creator" => Some("creator"),
                    _ => None,
                };
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(xml_error)?.trim().to_string();
                match current {
                    Some("title") if !text.is_empty() => properties.title = Some(text),
                    Some("creator") if !text.is_empty() => properties.creator = Some(text),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(properties)
}

/// `*.rels` を解析（Id -> Relationship）
fn parse_relationships(xml: &[u8]) -> Result<HashMap<String, Relationship>, XlsxRagError> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut relationships = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"Relationship" {
                    if let (Some(id), Some(target)) = (attribute(&e, b"Id")?, attribute(&e, b"Target")?) {
                        let kind = attribute(&e, b"Type")?.unwrap_or_default();
                        let external = attribute(&e, b"TargetMode")?.as_deref() == Some("External");
                        relationships.insert(id, Relationship { target, kind, external });
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(relationships)
}

/// パーツのリレーションシップファイルのパス（`xl/worksheets/sheet1.xml` -> `xl/worksheets/_rels/sheet1.xml.rels`）
fn rels_path(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// パーツのディレクトリ
fn part_dir(part: &str) -> &str {
    part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// リレーションシップのターゲットをパッケージ内の絶対パスに解決
///
/// `/`始まりはパッケージルートからのパス、それ以外は`base_dir`からの相対パスとして扱います。
fn resolve_target(base_dir: &str, target: &str) -> String {
    let mut segments: Vec<&str> = if target.starts_with('/') {
        Vec::new()
    } else {
        base_dir.split('/').filter(|s| !s.is_empty()).collect()
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// シートに配置された画像を読み込む
fn read_sheet_images<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    sheet_path: &str,
) -> Result<Vec<SheetImage>, XlsxRagError> {
    let Some(rels_xml) = read_entry(archive, &rels_path(sheet_path))? else {
        return Ok(Vec::new());
    };
    let sheet_rels = parse_relationships(&rels_xml)?;

    let mut drawing_paths: Vec<String> = sheet_rels
        .values()
        .filter(|r| !r.external && r.kind.ends_with("/drawing"))
        .map(|r| resolve_target(part_dir(sheet_path), &r.target))
        .collect();
    drawing_paths.sort();

    let mut images = Vec::new();
    for drawing_path in drawing_paths {
        let Some(drawing_xml) = read_entry(archive, &drawing_path)? else {
            continue;
        };
        let drawing_rels = match read_entry(archive, &rels_path(&drawing_path))? {
            Some(xml) => parse_relationships(&xml)?,
            None => HashMap::new(),
        };

        for anchor in parse_drawing(&drawing_xml)? {
            let Some(embed) = anchor.embed else {
                tracing::debug!(drawing = %drawing_path, "skipping linked image without embedded data");
                continue;
            };
            let Some(rel) = drawing_rels.get(&embed).filter(|r| !r.external) else {
                tracing::debug!(drawing = %drawing_path, rel_id = %embed, "image relationship not found");
                continue;
            };
            let media_path = resolve_target(part_dir(&drawing_path), &rel.target);
            let Some(data) = read_entry(archive, &media_path)? else {
                tracing::warn!(path = %media_path, "image part missing from package");
                continue;
            };
            let extension = media_path
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_ascii_lowercase())
                .unwrap_or_else(|| "bin".to_string());

            images.push(SheetImage {
                anchor: anchor.from,
                name: anchor.name,
                description: anchor.description,
                extension,
                data: Arc::new(data),
            });
        }
    }

    images.sort_by_key(|image| image.anchor);
    Ok(images)
}

/// 描画XML内の画像アンカー
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct PictureAnchor {
    from: CellCoord,
    name: Option<String>,
    description: Option<String>,
    embed: Option<String>,
    is_picture: bool,
}

/// `xl/drawings/drawingN.xml` を解析
///
/// `twoCellAnchor` と `oneCellAnchor` のうち、画像（`pic`）を含むものだけを返します。
fn parse_drawing(xml: &[u8]) -> Result<Vec<PictureAnchor>, XlsxRagError> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut anchors = Vec::new();
    let mut current: Option<PictureAnchor> = None;
    let mut in_from = false;
    let mut field: Option<&'static str> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"twoCellAnchor" | b"oneCellAnchor" => current = Some(PictureAnchor::default()),
                b"from" => in_from = true,
                b"col" if in_from => field = Some("col"),
                b"row" if in_from => field = Some("row"),
                b"pic" => {
                    if let Some(anchor) = current.as_mut() {
                        anchor.is_picture = true;
                    }
                }
                b"cNvPr" => read_picture_name(&e, current.as_mut())?,
                b"blip" => read_blip(&e, current.as_mut())?,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"cNvPr" => read_picture_name(&e, current.as_mut())?,
                b"blip" => read_blip(&e, current.as_mut())?,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if let (Some(name), Some(anchor)) = (field, current.as_mut()) {
                    let value: u32 = e.unescape().map_err(xml_error)?.trim().parse()?;
                    match name {
                        "col" => anchor.from.col = value,
                        _ => anchor.from.row = value,
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"twoCellAnchor" | b"oneCellAnchor" => {
                    if let Some(anchor) = current.take().filter(|a| a.is_picture) {
                        anchors.push(anchor);
                    }
                }
                b"from" => in_from = false,
                b"col" | b"row" => field = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(anchors)
}

fn read_picture_name(e: &BytesStart<'_>, anchor: Option<&mut PictureAnchor>) -> Result<(), XlsxRagError> {
    if let Some(anchor) = anchor {
        // グループ内の最初の cNvPr を画像の名前とする
        if anchor.name.is_none() {
            anchor.name = attribute(e, b"name")?;
            anchor.description = attribute(e, b"descr")?;
        }
    }
    Ok(())
}

fn read_blip(e: &BytesStart<'_>, anchor: Option<&mut PictureAnchor>) -> Result<(), XlsxRagError> {
    if let Some(anchor) = anchor {
        anchor.embed = attribute(e, b"embed")?;
    }
    Ok(())
}
