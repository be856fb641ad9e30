//! Conversion between layers and Loro values.

use crate::layer::{Bounds, Layer, LayerKind, Rgb};
use kurbo::Point;
use loro::{LoroList, LoroMap, LoroMapValue, LoroResult, LoroValue};

const KEY_ID: &str = "id";
const KEY_TYPE: &str = "type";

const KEY_X: &str = "x";
const KEY_Y: &str = "y";
const KEY_WIDTH: &str = "width";
const KEY_HEIGHT: &str = "height";

const KEY_FILL_R: &str = "fill_r";
const KEY_FILL_G: &str = "fill_g";
const KEY_FILL_B: &str = "fill_b";

const KEY_POINTS: &str = "points";

fn get_double(map: &LoroMapValue, key: &str) -> Option<f64> {
    match map.get(key)? {
        LoroValue::Double(d) => Some(*d),
        LoroValue::I64(i) => Some(*i as f64),
        _ => None,
    }
}

fn get_channel(map: &LoroMapValue, key: &str) -> Option<u8> {
    match map.get(key)? {
        LoroValue::I64(i) => u8::try_from(*i).ok(),
        LoroValue::Double(d) => Some(d.clamp(0.0, 255.0) as u8),
        _ => None,
    }
}

fn get_string(map: &LoroMapValue, key: &str) -> Option<String> {
    match map.get(key)? {
        LoroValue::String(s) => Some(s.to_string()),
        _ => None,
    }
}

fn coordinate(value: &LoroValue) -> Option<f64> {
    match value {
        LoroValue::Double(d) => Some(*d),
        LoroValue::I64(i) => Some(*i as f64),
        _ => None,
    }
}

/// Write a full layer record into an empty Loro map.
pub fn layer_to_loro(layer: &Layer, map: &LoroMap) -> LoroResult<()> {
    map.insert(KEY_ID, layer.id.as_str())?;
    map.insert(KEY_TYPE, layer.kind.as_str())?;
    bounds_to_loro(&layer.bounds, map)?;
    fill_to_loro(layer.fill, map)?;

    if layer.kind == LayerKind::Path {
        // Store points as a list of [x, y] pairs
        let points_list = map.insert_container(KEY_POINTS, LoroList::new())?;
        for point in &layer.points {
            let point_list = points_list.insert_container(points_list.len(), LoroList::new())?;
            point_list.push(point.x)?;
            point_list.push(point.y)?;
        }
    }

    Ok(())
}

/// Overwrite the geometry fields of a layer record.
///
/// Each field is its own last-writer-wins register, so concurrent edits to
/// different fields of the same layer both survive a merge.
pub fn bounds_to_loro(bounds: &Bounds, map: &LoroMap) -> LoroResult<()> {
    map.insert(KEY_X, bounds.x)?;
    map.insert(KEY_Y, bounds.y)?;
    map.insert(KEY_WIDTH, bounds.width)?;
    map.insert(KEY_HEIGHT, bounds.height)?;
    Ok(())
}

/// Overwrite the fill fields of a layer record.
pub fn fill_to_loro(fill: Rgb, map: &LoroMap) -> LoroResult<()> {
    map.insert(KEY_FILL_R, fill.r as i64)?;
    map.insert(KEY_FILL_G, fill.g as i64)?;
    map.insert(KEY_FILL_B, fill.b as i64)?;
    Ok(())
}

/// Read a layer back from its deep map value.
pub fn layer_from_loro(map: &LoroMapValue) -> Option<Layer> {
    let id = get_string(map, KEY_ID)?;
    let kind = LayerKind::parse(&get_string(map, KEY_TYPE)?)?;
    let bounds = Bounds::new(
        get_double(map, KEY_X)?,
        get_double(map, KEY_Y)?,
        get_double(map, KEY_WIDTH)?,
        get_double(map, KEY_HEIGHT)?,
    );
    let fill = Rgb::new(
        get_channel(map, KEY_FILL_R)?,
        get_channel(map, KEY_FILL_G)?,
        get_channel(map, KEY_FILL_B)?,
    );

    let points = match map.get(KEY_POINTS) {
        Some(LoroValue::List(points_list)) => points_list
            .iter()
            .filter_map(|p| match p {
                LoroValue::List(coords) if coords.len() >= 2 => {
                    Some(Point::new(coordinate(coords.first()?)?, coordinate(coords.get(1)?)?))
                }
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    Some(Layer {
        id,
        kind,
        bounds,
        fill,
        points,
    })
}
