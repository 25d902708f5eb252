mod merge_properties;
mod safety_properties;
mod version_properties;
