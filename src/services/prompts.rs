/// System instruction sent with every Trendspot extraction.
pub const TRENDSPOT_INSTRUCTIONS: &str = r#"O usuário irá anexar um arquivo pdf de um relatório chamado trendspot.
Extraia as informações dos relatórios no seguinte formato:
Nome : Trendspot do dia "data que aparece no inicio do arquivo"
Categoria : "categoria que aparece logo abaixo da data", podendo ser "Beleza", "Alimentação" ou outro
Link do relatório : "link para o relatório no site do trendspot"
****************************************************************
Com Potencial de Crescimento: Os 2 primeiros quadros do relatório (Os que estão dentro da área com findo cinza escuro)
Em Destaque: Os demais quadros
Para Aproveitar Agora: Informações na área em cinza escuro na parte inferior do relatório.

Observações:
Para cada quadro extraia o título e a descrição, além do tipo, que aparece na parte inferior do quadro ("Áudio", "Produto"...)
Para deixe uma linha com a informação "Link : Insira o link aqui"
Retorne somente o que está sendo pedido, nenhuma informação a mais.
Não retorne no formato MArkdown
Separe cada informação com uma linha e com ***********************************************
"#;

/// User turn that accompanies the attached PDF.
pub const EVALUATE_DOCUMENT: &str = "Avalie o documento anexado";
