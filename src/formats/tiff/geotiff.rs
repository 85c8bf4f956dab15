//! GeoTIFF georeferencing and GDAL metadata tags

use std::collections::BTreeMap;
use crate::error::{Error, Result};
use crate::grid::{GeoTransform, Projection};
use crate::io::ByteOrder;
use super::ifd::IFD;
use super::tags::{self, geo_keys};

/// Prefix some writers put before a WKT citation
const ESRI_PE_PREFIX: &str = "ESRI PE String = ";

/// EPSG value meaning "user-defined"
const USER_DEFINED: u16 = 32767;

/// Georeferencing and value metadata extracted from an IFD
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoInfo {
    pub transform: Option<GeoTransform>,
    pub projection: Projection,
    /// EPSG code if detected
    pub epsg_code: Option<u16>,
    pub nodata: Option<f64>,
    /// Dataset-level GDAL metadata items
    pub metadata: BTreeMap<String, String>,
    /// Band 0 scale
    pub scale: Option<f64>,
    /// Band 0 offset
    pub offset: Option<f64>,
}

impl GeoInfo {
    /// Extracts georeferencing from an IFD
    pub fn from_ifd(ifd: &IFD, data: &[u8], order: ByteOrder) -> Result<Self> {
        let mut info = GeoInfo {
            transform: read_transform(ifd, data, order)?,
            ..GeoInfo::default()
        };

        let ascii = match ifd.get_entry(tags::GEO_ASCII_PARAMS) {
            Some(entry) => entry.read_ascii(data)?,
            None => String::new(),
        };

        let mut citation = None;
        if let Some(entry) = ifd.get_entry(tags::GEO_KEY_DIRECTORY) {
            let keys: Vec<u16> = entry.read_u64s(data, order)?.into_iter().map(|k| k as u16).collect();
            for key in parse_geo_keys(&keys) {
                match (key.id, key.location) {
                    (geo_keys::GEOGRAPHIC_TYPE | geo_keys::PROJECTED_CS_TYPE, 0)
                        if key.value != USER_DEFINED && key.value != 0 =>
                    {
                        info.epsg_code = Some(key.value);
                    }
                    (
                        geo_keys::GT_CITATION | geo_keys::PROJ_CITATION | geo_keys::GEOG_CITATION,
                        tags::GEO_ASCII_PARAMS,
                    ) if citation.is_none() => {
                        citation = ascii_param(&ascii, key.value as usize, key.count as usize);
                    }
                    _ => {}
                }
            }
        } else if !ascii.is_empty() {
            citation = Some(ascii.trim_end_matches('|').to_string());
        }

        info.projection = resolve_projection(citation.as_deref(), info.epsg_code);

        if let Some(entry) = ifd.get_entry(tags::GDAL_NODATA) {
            let text = entry.read_ascii(data)?;
            info.nodata = Some(text.trim().parse::<f64>().map_err(|_| {
                Error::InvalidFormat(format!("Unparsable GDAL_NODATA value '{}'", text))
            })?);
        }

        if let Some(entry) = ifd.get_entry(tags::GDAL_METADATA) {
            let xml = entry.read_ascii(data)?;
            let parsed = parse_gdal_metadata(&xml);
            info.metadata = parsed.dataset;
            info.scale = parsed.scale;
            info.offset = parsed.offset;
        }

        Ok(info)
    }
}

fn read_transform(ifd: &IFD, data: &[u8], order: ByteOrder) -> Result<Option<GeoTransform>> {
    if let Some(entry) = ifd.get_entry(tags::MODEL_TRANSFORMATION) {
        let m = entry.read_f64s(data, order)?;
        if m.len() >= 16 {
            return Ok(Some(GeoTransform::from_array([m[3], m[0], m[1], m[7], m[4], m[5]])));
        }
    }

    let scale = match ifd.get_entry(tags::MODEL_PIXEL_SCALE) {
        Some(entry) => entry.read_f64s(data, order)?,
        None => return Ok(None),
    };
    let tiepoint = match ifd.get_entry(tags::MODEL_TIEPOINT) {
        Some(entry) => entry.read_f64s(data, order)?,
        None => return Ok(None),
    };
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(Error::InvalidFormat(
            "Truncated ModelPixelScale or ModelTiepoint".to_string(),
        ));
    }

    let (scale_x, scale_y) = (scale[0], scale[1]);
    Ok(Some(GeoTransform::new(
        tiepoint[3] - tiepoint[0] * scale_x,
        scale_x,
        tiepoint[4] + tiepoint[1] * scale_y,
        -scale_y,
    )))
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct GeoKey {
    id: u16,
    location: u16,
    count: u16,
    value: u16,
}

fn parse_geo_keys(directory: &[u16]) -> Vec<GeoKey> {
    if directory.len() < 4 {
        return Vec::new();
    }
    directory[4..]
        .chunks_exact(4)
        .take(directory[3] as usize)
        .map(|k| GeoKey { id: k[0], location: k[1], count: k[2], value: k[3] })
        .collect()
}

fn ascii_param(ascii: &str, offset: usize, count: usize) -> Option<String> {
    let end = (offset + count).min(ascii.len());
    let text = ascii.get(offset..end)?.trim_end_matches('|').trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn resolve_projection(citation: Option<&str>, epsg: Option<u16>) -> Projection {
    if let Some(text) = citation {
        let text = text.strip_prefix(ESRI_PE_PREFIX).unwrap_or(text);
        if text.contains('[') {
            return Projection::new(text);
        }
    }
    if let Some(code) = epsg {
        return Projection::new(&format!("EPSG:{}", code));
    }
    citation.map(Projection::new).unwrap_or_default()
}

/// Affine georeferencing as written to tags
#[derive(Debug, Clone, PartialEq)]
pub enum TransformTags {
    /// ModelPixelScale and ModelTiepoint, for north-up transforms
    ScaleTiepoint { scale: [f64; 3], tiepoint: [f64; 6] },
    /// ModelTransformation matrix, for rotated or south-up transforms
    Matrix([f64; 16]),
}

impl TransformTags {
    pub fn from_transform(t: &GeoTransform) -> Self {
        if t.is_north_up() && t.pixel_height < 0.0 {
            TransformTags::ScaleTiepoint {
                scale: [t.pixel_width, -t.pixel_height, 0.0],
                tiepoint: [0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0],
            }
        } else {
            TransformTags::Matrix([
                t.pixel_width, t.row_rotation, 0.0, t.origin_x,
                t.col_rotation, t.pixel_height, 0.0, t.origin_y,
                0.0, 0.0, 0.0, 0.0,
                0.0, 0.0, 0.0, 1.0,
            ])
        }
    }
}

/// GeoKeyDirectory and GeoAsciiParams describing `projection`
///
/// `EPSG:n` descriptors become a CRS code key; anything else is stored
/// verbatim as the citation.
pub fn geo_key_directory(projection: &Projection) -> (Vec<u16>, String) {
    let text = projection.as_str();
    let epsg = text
        .strip_prefix("EPSG:")
        .and_then(|code| code.parse::<u16>().ok());

    let mut keys: Vec<[u16; 4]> = Vec::new();
    let mut ascii = String::new();

    let geographic = match epsg {
        Some(code) => (4000..5000).contains(&code),
        None => text.starts_with("GEOGCS") || text.starts_with("GEOGCRS"),
    };
    let model = if geographic { geo_keys::MODEL_GEOGRAPHIC } else { geo_keys::MODEL_PROJECTED };

    keys.push([geo_keys::GT_MODEL_TYPE, 0, 1, model]);
    keys.push([geo_keys::GT_RASTER_TYPE, 0, 1, geo_keys::RASTER_PIXEL_IS_AREA]);

    match epsg {
        Some(code) => {
            let key = if geographic { geo_keys::GEOGRAPHIC_TYPE } else { geo_keys::PROJECTED_CS_TYPE };
            keys.push([key, 0, 1, code]);
        }
        None if !text.is_empty() => {
            ascii.push_str(text);
            ascii.push('|');
            keys.push([geo_keys::GT_CITATION, tags::GEO_ASCII_PARAMS, ascii.len() as u16, 0]);
        }
        None => {}
    }

    keys.sort_by_key(|k| k[0]);

    let mut directory = vec![1, 1, 0, keys.len() as u16];
    for key in keys {
        directory.extend_from_slice(&key);
    }
    (directory, ascii)
}

/// Text written to GDAL_NODATA
pub fn format_nodata(nodata: f64) -> String {
    if nodata.is_nan() {
        "nan".to_string()
    } else {
        format!("{}", nodata)
    }
}

/// Contents of a GDAL_METADATA document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GdalMetadata {
    pub dataset: BTreeMap<String, String>,
    pub scale: Option<f64>,
    pub offset: Option<f64>,
}

/// Builds a GDAL_METADATA document; `None` when there is nothing to record
pub fn gdal_metadata_xml(
    metadata: &BTreeMap<String, String>,
    scale: Option<f64>,
    offset: Option<f64>,
    band_count: usize,
) -> Option<String> {
    if metadata.is_empty() && scale.is_none() && offset.is_none() {
        return None;
    }

    let mut xml = String::from("<GDALMetadata>\n");
    for (name, value) in metadata {
        xml.push_str(&format!("  <Item name=\"{}\">{}</Item>\n", escape(name), escape(value)));
    }
    for band in 0..band_count {
        if let Some(offset) = offset {
            xml.push_str(&format!(
                "  <Item name=\"OFFSET\" sample=\"{}\" role=\"offset\">{}</Item>\n",
                band, offset
            ));
        }
        if let Some(scale) = scale {
            xml.push_str(&format!(
                "  <Item name=\"SCALE\" sample=\"{}\" role=\"scale\">{}</Item>\n",
                band, scale
            ));
        }
    }
    xml.push_str("</GDALMetadata>");
    Some(xml)
}

/// Parses a GDAL_METADATA document
///
/// Items without a `sample` attribute are dataset metadata; band 0
/// `scale`/`offset` roles fill the corresponding fields.
pub fn parse_gdal_metadata(xml: &str) -> GdalMetadata {
    let mut parsed = GdalMetadata::default();
    let mut rest = xml;

    while let Some(start) = rest.find("<Item") {
        rest = &rest[start + 5..];
        let Some(tag_end) = rest.find('>') else { break };
        let attributes = &rest[..tag_end];
        rest = &rest[tag_end + 1..];
        let Some(close) = rest.find("</Item>") else { break };
        let value = unescape(&rest[..close]);
        rest = &rest[close + 7..];

        let name = attribute(attributes, "name");
        let sample = attribute(attributes, "sample");
        let role = attribute(attributes, "role");

        match (sample.as_deref(), role.as_deref()) {
            (None, _) => {
                if let Some(name) = name {
                    parsed.dataset.insert(name, value);
                }
            }
            (Some("0"), Some("scale")) => parsed.scale = value.trim().parse().ok(),
            (Some("0"), Some("offset")) => parsed.offset = value.trim().parse().ok(),
            _ => {}
        }
    }

    parsed
}

fn attribute(attributes: &str, name: &str) -> Option<String> {
    let needle = format!("{}=\"", name);
    let mut search = attributes;
    loop {
        let pos = search.find(&needle)?;
        let preceded_by_space = pos == 0 || search[..pos].ends_with(char::is_whitespace);
        let after = &search[pos + needle.len()..];
        if preceded_by_space {
            let end = after.find('"')?;
            return Some(unescape(&after[..end]));
        }
        search = after;
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_north_up_uses_scale_and_tiepoint() {
        let t = GeoTransform::new(-100.0, 2.0, 50.0, -3.0);
        match TransformTags::from_transform(&t) {
            TransformTags::ScaleTiepoint { scale, tiepoint } => {
                assert_eq!(scale, [2.0, 3.0, 0.0]);
                assert_eq!(tiepoint[3], -100.0);
                assert_eq!(tiepoint[4], 50.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_rotated_uses_matrix() {
        let t = GeoTransform::from_array([10.0, 1.0, 0.5, 20.0, 0.25, -1.0]);
        match TransformTags::from_transform(&t) {
            TransformTags::Matrix(m) => {
                assert_eq!([m[3], m[0], m[1], m[7], m[4], m[5]], t.to_array());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_geo_keys_for_wkt() {
        let projection = Projection::equirectangular_sphere("Moon", 1_737_400.0);
        let (directory, ascii) = geo_key_directory(&projection);

        assert_eq!(directory[3], 3);
        assert!(ascii.ends_with('|'));
        let keys = parse_geo_keys(&directory);
        let citation = keys.iter().find(|k| k.id == geo_keys::GT_CITATION).unwrap();
        assert_eq!(
            ascii_param(&ascii, citation.value as usize, citation.count as usize).unwrap(),
            projection.as_str()
        );
        assert_eq!(resolve_projection(Some(projection.as_str()), None), projection);
    }

    #[test]
    fn test_geo_keys_for_epsg() {
        let (directory, ascii) = geo_key_directory(&Projection::new("EPSG:4326"));
        assert!(ascii.is_empty());
        let keys = parse_geo_keys(&directory);
        assert!(keys.contains(&GeoKey { id: geo_keys::GEOGRAPHIC_TYPE, location: 0, count: 1, value: 4326 }));
        assert!(keys.contains(&GeoKey {
            id: geo_keys::GT_MODEL_TYPE,
            location: 0,
            count: 1,
            value: geo_keys::MODEL_GEOGRAPHIC,
        }));
    }

    #[test]
    fn test_projection_resolution_order() {
        assert_eq!(
            resolve_projection(Some("ESRI PE String = GEOGCS[\"x\"]"), Some(4326)),
            Projection::new("GEOGCS[\"x\"]")
        );
        assert_eq!(resolve_projection(Some("WGS 84"), Some(4326)), Projection::new("EPSG:4326"));
        assert_eq!(resolve_projection(Some("WGS 84"), None), Projection::new("WGS 84"));
        assert!(resolve_projection(None, None).is_empty());
    }

    #[test]
    fn test_gdal_metadata_roundtrip() {
        let mut metadata = BTreeMap::new();
        metadata.insert("MinimumLongitude".to_string(), "0".to_string());
        metadata.insert("Note".to_string(), "a < b & c".to_string());

        let xml = gdal_metadata_xml(&metadata, Some(0.5), Some(1_737_400.0), 2).unwrap();
        let parsed = parse_gdal_metadata(&xml);

        assert_eq!(parsed.dataset, metadata);
        assert_eq!(parsed.scale, Some(0.5));
        assert_eq!(parsed.offset, Some(1_737_400.0));
    }

    #[test]
    fn test_gdal_metadata_from_gdal() {
        let xml = r#"<GDALMetadata>
  <Item name="AREA_OR_POINT">Area</Item>
  <Item name="STATISTICS_MAXIMUM" sample="0">10</Item>
  <Item name="SCALE" sample="0" role="scale">2</Item>
</GDALMetadata>"#;
        let parsed = parse_gdal_metadata(xml);
        assert_eq!(parsed.dataset.len(), 1);
        assert_eq!(parsed.scale, Some(2.0));
        assert_eq!(parsed.offset, None);
    }

    #[test]
    fn test_nothing_to_record() {
        assert!(gdal_metadata_xml(&BTreeMap::new(), None, None, 1).is_none());
        assert_eq!(format_nodata(-32768.0), "-32768");
        assert_eq!(format_nodata(f64::NAN), "nan");
    }
}
