use crate::jvm::class_file::{
    Attribute, BootstrapMethods, ClassFile, Code, Method, StackMapTable, VerificationType,
};
use crate::jvm::code::{decode, encode, initial_locals, DecodeContext, EncodeContext, MethodBody};
use crate::jvm::{Error, MethodAccessFlags, MethodDescriptor, ParseDescriptor};

/// Parsed class whose method bodies can be edited
///
/// Everything outside of method bodies is kept exactly as it was read. The constant pool only
/// ever grows, so the indices used by untouched attributes stay valid.
pub struct ClassModel {
    pub class: ClassFile,

    /// Internal name of the class
    pub name: String,
    pub methods: Vec<MethodModel>,
}

pub struct MethodModel {
    pub name: String,
    pub descriptor: String,
    pub access_flags: MethodAccessFlags,

    /// Decoded `Code` attribute (`None` for abstract and native methods)
    pub body: Option<MethodBody>,

    /// Types of the locals on entry (only filled in when the body has stack map frames)
    pub initial_locals: Vec<VerificationType<usize>>,

    /// Every attribute other than `Code`, untouched
    pub attributes: Vec<Attribute>,

    method: Method,
}

impl ClassModel {
    pub fn parse(bytes: &[u8]) -> Result<ClassModel, Error> {
        let mut class = ClassFile::parse(bytes)?;
        let name = class.this_class_name()?;

        let mut bootstrap_methods = vec![];
        for attribute in &class.attributes {
            if attribute.is::<BootstrapMethods>(&class.constants) {
                bootstrap_methods = attribute.parse::<BootstrapMethods>()?.0;
            }
        }

        let methods = std::mem::take(&mut class.methods);
        let mut models = Vec::with_capacity(methods.len());
        for method in methods {
            let method_name = class.constants.utf8(method.name_index)?;
            let descriptor = class.constants.utf8(method.descriptor_index)?;

            let mut code = None;
            let mut attributes = vec![];
            for attribute in &method.attributes {
                if code.is_none() && attribute.is::<Code>(&class.constants) {
                    code = Some(attribute.parse::<Code>()?);
                } else {
                    attributes.push(attribute.clone());
                }
            }

            let mut locals = vec![];
            let body = match code {
                None => None,
                Some(code) => {
                    let has_frames = code
                        .attributes
                        .iter()
                        .any(|attribute| attribute.is::<StackMapTable>(&class.constants));
                    if has_frames {
                        locals = initial_locals(
                            &mut class.constants,
                            class.this_class,
                            &method_name,
                            &MethodDescriptor::parse(&descriptor)?,
                            method.access_flags,
                        )?;
                    }
                    let context = DecodeContext {
                        constants: &class.constants,
                        bootstrap_methods: &bootstrap_methods,
                        initial_locals: locals.clone(),
                    };
                    Some(decode(&code, &context)?)
                }
            };

            models.push(MethodModel {
                name: method_name,
                descriptor,
                access_flags: method.access_flags,
                body,
                initial_locals: locals,
                attributes,
                method,
            });
        }

        Ok(ClassModel {
            class,
            name,
            methods: models,
        })
    }

    /// Lay out every method body and serialize the class
    pub fn to_bytes(mut self) -> Result<Vec<u8>, Error> {
        let mut methods = Vec::with_capacity(self.methods.len());
        for model in self.methods {
            let mut method = model.method;
            method.access_flags = model.access_flags;
            method.attributes = vec![];
            if let Some(body) = &model.body {
                let context = EncodeContext {
                    method_name: &model.name,
                    initial_locals: &model.initial_locals,
                    this_class: self.class.this_class,
                };
                let code = encode(body, &mut self.class.constants, &context)?;
                method
                    .attributes
                    .push(self.class.constants.get_attribute(&code)?);
            }
            method.attributes.extend(model.attributes);
            methods.push(method);
        }
        self.class.methods = methods;
        self.class.to_bytes()
    }
}

impl MethodModel {
    /// `name(descriptor)`, for messages
    pub fn signature(&self) -> String {
        format!("{}{}", self.name, self.descriptor)
    }
}
