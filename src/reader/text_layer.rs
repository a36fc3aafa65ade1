use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId};
use std::collections::BTreeMap;
use std::io::Read as IoRead;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{handle_page_error, load_document, PageText};
use crate::config::PageErrorPolicy;
use crate::utils::LabResult;

/// Letter size, used when a page has no usable MediaBox
const DEFAULT_PAGE_HEIGHT: f32 = 792.0;

/// TJ 数组中小于该值的字距调整视为单词间空格
const TJ_SPACE_THRESHOLD: f32 = -200.0;

/// 电子版PDF：直接读取文本层，按文本块位置排序拼接
pub struct TextLayerReader {
    on_page_error: PageErrorPolicy,
}

/// BT…ET 之间的一个文本对象
#[derive(Debug, Clone, PartialEq)]
struct TextBlock {
    top: f32,
    left: f32,
    text: String,
}

#[derive(Default)]
struct BlockBuilder {
    origin: Option<(f32, f32)>,
    pos: (f32, f32),
    last_y: Option<f32>,
    text: String,
}

impl BlockBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        if !self.text.is_empty() {
            if self.last_y.map_or(false, |last| (last - y).abs() > f32::EPSILON) {
                self.newline();
            } else {
                self.space();
            }
        }
        self.pos = (x, y);
    }

    fn show(&mut self, s: &str) {
        if s.is_empty() {
            return;
        }
        if self.origin.is_none() {
            self.origin = Some(self.pos);
        }
        self.text.push_str(s);
        self.last_y = Some(self.pos.1);
    }

    fn space(&mut self) {
        if !self.text.is_empty() && !self.text.ends_with(char::is_whitespace) {
            self.text.push(' ');
        }
    }

    fn newline(&mut self) {
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            while self.text.ends_with(' ') {
                self.text.pop();
            }
            self.text.push('\n');
        }
    }

    fn finish(self, page_height: f32) -> Option<TextBlock> {
        let text = self.text.trim().to_string();
        let (x, y) = self.origin?;
        if text.is_empty() {
            return None;
        }
        Some(TextBlock {
            top: page_height - y,
            left: x,
            text,
        })
    }
}

impl TextLayerReader {
    pub fn new(on_page_error: PageErrorPolicy) -> Self {
        Self { on_page_error }
    }

    pub fn read_pages(&self, pdf_path: &Path) -> LabResult<Vec<PageText>> {
        info!("读取PDF文本层: {}", pdf_path.display());
        let doc = load_document(pdf_path)?;
        self.read_document(&doc)
    }

    pub fn read_document(&self, doc: &Document) -> LabResult<Vec<PageText>> {
        let mut pages = Vec::new();
        for (index, (_, page_id)) in doc.get_pages().into_iter().enumerate() {
            let page = match page_text(doc, page_id) {
                Ok(text) => {
                    if text.trim().is_empty() {
                        warn!(page = index + 1, "页面没有文本层，可能是扫描件");
                    }
                    PageText::ok(index, text)
                }
                Err(e) => handle_page_error(self.on_page_error, index, e)?,
            };
            pages.push(page);
        }
        Ok(pages)
    }
}

/// 一页的文本：文本块按 (上边距, 左边距) 升序排列，每块一行或多行
fn page_text(doc: &Document, page_id: ObjectId) -> LabResult<String> {
    let content = Content::decode(&page_content(doc, page_id)?)?;

    // 每个字体的编码（含 ToUnicode CMap）只解析一次
    let fonts = doc.get_page_fonts(page_id).unwrap_or_default();
    let encodings: BTreeMap<Vec<u8>, _> = fonts
        .iter()
        .filter_map(|(name, font)| font.get_font_encoding(doc).ok().map(|encoding| (name.clone(), encoding)))
        .collect();
    let decode = |font: &[u8], bytes: &[u8]| {
        if bytes.starts_with(&[0xFE, 0xFF]) {
            return decode_pdf_string(bytes);
        }
        encodings
            .get(font)
            .and_then(|encoding| Document::decode_text(encoding, bytes).ok())
            .unwrap_or_else(|| decode_pdf_string(bytes))
    };

    let mut blocks = collect_blocks(&content.operations, page_height(doc, page_id), decode);
    blocks.sort_by(|a, b| a.top.total_cmp(&b.top).then(a.left.total_cmp(&b.left)));
    debug!("页面 {:?} 共 {} 个文本块", page_id, blocks.len());

    let mut text = String::new();
    for block in blocks {
        text.push_str(&block.text);
        text.push('\n');
    }
    Ok(text)
}

fn page_content(doc: &Document, page_id: ObjectId) -> LabResult<Vec<u8>> {
    let mut content = Vec::new();
    for object_id in doc.get_page_contents(page_id) {
        let stream = doc.get_object(object_id)?.as_stream()?;
        let data = match stream.decompressed_content() {
            Ok(data) => data,
            // lopdf 的解压有时会失败，手动再试一次
            Err(_) if stream.dict.has(b"Filter") => manual_inflate(&stream.content)?,
            Err(_) => stream.content.clone(),
        };
        content.extend_from_slice(&data);
        content.push(b'\n');
    }
    Ok(content)
}

/// `decode` 按当前 `Tf` 字体名把字符串字节解码为文本
fn collect_blocks<F>(operations: &[Operation], page_height: f32, decode: F) -> Vec<TextBlock>
where
    F: Fn(&[u8], &[u8]) -> String,
{
    let mut blocks = Vec::new();
    let mut current: Option<BlockBuilder> = None;
    let mut font: Vec<u8> = Vec::new();
    let (mut line_x, mut line_y) = (0.0f32, 0.0f32);
    let mut leading = 0.0f32;

    for op in operations {
        let operands = op.operands.as_slice();
        match op.operator.as_str() {
            "BT" => {
                line_x = 0.0;
                line_y = 0.0;
                current = Some(BlockBuilder::default());
            }
            "ET" => {
                if let Some(block) = current.take().and_then(|b| b.finish(page_height)) {
                    blocks.push(block);
                }
            }
            "Tf" => {
                if let Some(Ok(name)) = operands.first().map(Object::as_name) {
                    font = name.to_vec();
                }
            }
            "TL" => leading = number(operands, 0),
            "Td" | "TD" => {
                let (tx, ty) = (number(operands, 0), number(operands, 1));
                if op.operator == "TD" {
                    leading = -ty;
                }
                line_x += tx;
                line_y += ty;
                if let Some(b) = current.as_mut() {
                    b.move_to(line_x, line_y);
                }
            }
            "Tm" => {
                line_x = number(operands, 4);
                line_y = number(operands, 5);
                if let Some(b) = current.as_mut() {
                    b.move_to(line_x, line_y);
                }
            }
            "T*" | "'" | "\"" => {
                line_y -= leading;
                if let Some(b) = current.as_mut() {
                    b.newline();
                    b.move_to(line_x, line_y);
                    let shown = match op.operator.as_str() {
                        "'" => operands.first(),
                        "\"" => operands.get(2),
                        _ => None,
                    };
                    if let Some(Object::String(bytes, _)) = shown {
                        b.show(&decode(&font, bytes));
                    }
                }
            }
            "Tj" => {
                if let (Some(b), Some(Object::String(bytes, _))) = (current.as_mut(), operands.first()) {
                    b.show(&decode(&font, bytes));
                }
            }
            "TJ" => {
                if let (Some(b), Some(Object::Array(items))) = (current.as_mut(), operands.first()) {
                    for item in items {
                        match item {
                            Object::String(bytes, _) => b.show(&decode(&font, bytes)),
                            Object::Integer(_) | Object::Real(_) => {
                                if number(std::slice::from_ref(item), 0) < TJ_SPACE_THRESHOLD {
                                    b.space();
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
            _ => {}
        }
    }

    // Unterminated text object at the end of the stream
    if let Some(block) = current.and_then(|b| b.finish(page_height)) {
        blocks.push(block);
    }
    blocks
}

fn number(operands: &[Object], index: usize) -> f32 {
    match operands.get(index) {
        Some(Object::Integer(v)) => *v as f32,
        Some(Object::Real(v)) => *v as f32,
        _ => 0.0,
    }
}

fn page_height(doc: &Document, page_id: ObjectId) -> f32 {
    doc.get_dictionary(page_id)
        .ok()
        .and_then(|page| page.get(b"MediaBox").ok())
        .and_then(|media_box| match media_box {
            Object::Reference(id) => doc.get_object(*id).ok(),
            other => Some(other),
        })
        .and_then(|media_box| media_box.as_array().ok())
        .filter(|values| values.len() == 4)
        .map(|values| number(values, 3) - number(values, 1))
        .unwrap_or(DEFAULT_PAGE_HEIGHT)
}

/// 字体编码无法解码时的退路：UTF-16BE（带BOM）或按单字节 Latin-1 解码
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// 手动使用 flate2 解压：先按 zlib，再按裸 deflate
fn manual_inflate(compressed: &[u8]) -> LabResult<Vec<u8>> {
    let mut decoder = flate2::read::ZlibDecoder::new(compressed);
    let mut result = Vec::new();
    if decoder.read_to_end(&mut result).is_ok() {
        return Ok(result);
    }

    let mut decoder = flate2::read::DeflateDecoder::new(compressed);
    result.clear();
    decoder.read_to_end(&mut result)?;
    Ok(result)
}
