mod data;
mod xml;

pub use data::{parse_csv_data, parse_properties_data, parse_test_data, parse_xml_data, DataFormat};
pub use xml::parse_script_xml;
