use dicom::core::Tag;
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::{DefaultDicomObject, InMemDicomObject};

/// Small helper trait to pull optional typed values from different DICOM object shapes.
///
/// Missing elements, empty strings and unparsable numbers all come back as `None`.
pub trait ElementAccess {
    fn element_str(&self, tag: Tag) -> Option<String>;
    fn element_i32(&self, tag: Tag) -> Option<i32>;
    fn element_f64(&self, tag: Tag) -> Option<f64>;

    fn element_u32(&self, tag: Tag) -> Option<u32> {
        self.element_i32(tag).and_then(|v| u32::try_from(v).ok())
    }
}

fn dataset_str(obj: &InMemDicomObject<StandardDataDictionary>, tag: Tag) -> Option<String> {
    obj.element(tag)
        .ok()
        .and_then(|e| e.to_str().ok())
        .map(|s| s.trim_matches(|c: char| c == '\0' || c.is_whitespace()).to_string())
        .filter(|s| !s.is_empty())
}

fn dataset_i32(obj: &InMemDicomObject<StandardDataDictionary>, tag: Tag) -> Option<i32> {
    obj.element(tag).ok().and_then(|e| e.to_int::<i32>().ok())
}

fn dataset_f64(obj: &InMemDicomObject<StandardDataDictionary>, tag: Tag) -> Option<f64> {
    obj.element(tag)
        .ok()
        .and_then(|e| e.to_float64().ok())
        .filter(|v| v.is_finite())
}

impl ElementAccess for DefaultDicomObject {
    fn element_str(&self, tag: Tag) -> Option<String> {
        dataset_str(self, tag)
    }

    fn element_i32(&self, tag: Tag) -> Option<i32> {
        dataset_i32(self, tag)
    }

    fn element_f64(&self, tag: Tag) -> Option<f64> {
        dataset_f64(self, tag)
    }
}

impl ElementAccess for InMemDicomObject<StandardDataDictionary> {
    fn element_str(&self, tag: Tag) -> Option<String> {
        dataset_str(self, tag)
    }

    fn element_i32(&self, tag: Tag) -> Option<i32> {
        dataset_i32(self, tag)
    }

    fn element_f64(&self, tag: Tag) -> Option<f64> {
        dataset_f64(self, tag)
    }
}
