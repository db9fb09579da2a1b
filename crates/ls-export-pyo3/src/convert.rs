use std::path::PathBuf;

use export_core::{Detection, Error, ExportSummary, ImageDetections, Mask, RawBox};
use numpy::PyReadonlyArray2;
use pyo3::exceptions::{PyIOError, PyKeyError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyDict, PyList, PyString};
use serde_json::Value;

pub fn to_py_err(err: Error) -> PyErr {
    match err {
        Error::Io { .. } | Error::Image(_) => PyIOError::new_err(err.to_string()),
        Error::Backend(_) => PyRuntimeError::new_err(err.to_string()),
        _ => PyValueError::new_err(err.to_string()),
    }
}

fn required<'py>(dict: &Bound<'py, PyDict>, key: &str) -> PyResult<Bound<'py, PyAny>> {
    dict.get_item(key)?
        .ok_or_else(|| PyKeyError::new_err(key.to_string()))
}

/// `[{path, width, height, detections: [...]}]` -> detections per image.
pub fn py_to_results(results: &Bound<'_, PyList>) -> PyResult<Vec<ImageDetections>> {
    results
        .iter()
        .map(|item| py_to_image_detections(item.downcast::<PyDict>()?))
        .collect()
}

fn py_to_image_detections(dict: &Bound<'_, PyDict>) -> PyResult<ImageDetections> {
    let path: PathBuf = required(dict, "path")?.extract()?;
    let width: u32 = required(dict, "width")?.extract()?;
    let height: u32 = required(dict, "height")?.extract()?;
    let detections = match dict.get_item("detections")? {
        Some(list) => list
            .downcast::<PyList>()?
            .iter()
            .map(|d| py_to_detection(d.downcast::<PyDict>()?))
            .collect::<PyResult<Vec<_>>>()?,
        None => vec![],
    };
    Ok(ImageDetections {
        path,
        width,
        height,
        detections,
    })
}

fn py_to_detection(dict: &Bound<'_, PyDict>) -> PyResult<Detection> {
    let label: String = required(dict, "label")?.extract()?;
    let score: f64 = required(dict, "score")?.extract()?;
    let xyxy: [f64; 4] = required(dict, "box")?.extract()?;
    let mask = match dict.get_item("mask")? {
        Some(obj) if !obj.is_none() => Some(py_to_mask(&obj)?),
        _ => None,
    };
    Ok(Detection {
        label,
        score,
        bbox: RawBox::from(xyxy),
        mask,
    })
}

/// `(H, W)` uint8 or bool array; any non-zero cell is occupied.
fn py_to_mask(obj: &Bound<'_, PyAny>) -> PyResult<Mask> {
    let (height, width, data) = if let Ok(arr) = obj.extract::<PyReadonlyArray2<u8>>() {
        let view = arr.as_array();
        let (h, w) = view.dim();
        (h, w, view.iter().copied().collect::<Vec<u8>>())
    } else {
        let arr: PyReadonlyArray2<bool> = obj.extract()?;
        let view = arr.as_array();
        let (h, w) = view.dim();
        (h, w, view.iter().map(|&v| u8::from(v)).collect())
    };
    Mask::from_shape(height, width, data).map_err(to_py_err)
}

pub fn summary_to_py(py: Python<'_>, summary: &ExportSummary) -> PyResult<PyObject> {
    let dict = PyDict::new(py);
    dict.set_item("path", summary.path.to_string_lossy().into_owned())?;
    dict.set_item("images", summary.images)?;
    dict.set_item("categories", summary.categories)?;
    dict.set_item("annotations", summary.annotations)?;
    Ok(dict.into_any().unbind())
}

/// Plain Python lists/dicts/scalars for a JSON value.
pub fn json_to_py(py: Python<'_>, value: &Value) -> PyResult<PyObject> {
    Ok(match value {
        Value::Null => py.None(),
        Value::Bool(b) => PyBool::new(py, *b).to_owned().into_any().unbind(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.into_pyobject(py)?.into_any().unbind()
            } else if let Some(u) = n.as_u64() {
                u.into_pyobject(py)?.into_any().unbind()
            } else {
                n.as_f64()
                    .unwrap_or(f64::NAN)
                    .into_pyobject(py)?
                    .into_any()
                    .unbind()
            }
        }
        Value::String(s) => PyString::new(py, s).into_any().unbind(),
        Value::Array(items) => {
            let list = PyList::empty(py);
            for item in items {
                list.append(json_to_py(py, item)?)?;
            }
            list.into_any().unbind()
        }
        Value::Object(map) => {
            let dict = PyDict::new(py);
            for (key, item) in map {
                dict.set_item(key.as_str(), json_to_py(py, item)?)?;
            }
            dict.into_any().unbind()
        }
    })
}
